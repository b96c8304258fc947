pub mod traits;
pub mod notifiers;
pub mod uploaders;

pub use traits::{ImageUploader, Mailer};
pub use notifiers::EmailNotifier;
pub use uploaders::ObjectStoreUploader;
