pub mod notifier;
pub mod uploader;

pub use notifier::Mailer;
pub use uploader::ImageUploader;
