use posts_notifier::SeenKind;
use posts_notifier::scanner::{FeedScanner, ScanKind, marketplace, run_scan};

use super::*;

#[tokio::test]
async fn test_marketplace_new_items_are_mailed_and_recorded() {
    let h = harness().await;
    let page = FakePage::new(
        MARKETPLACE_URL,
        vec![marketplace_html(&[("101", "Sofa"), ("102", "Desk"), ("101", "Sofa (updated)")])],
    );

    let report = marketplace::scan(page.as_ref(), &h.ctx).await.unwrap();

    assert_eq!(report.kind, ScanKind::Marketplace);
    assert_eq!(report.reported, 2);
    assert_eq!(report.new_ids, 2);
    assert!(report.email_sent);

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains("https://www.facebook.com/marketplace/item/101/"));
    assert!(sent[0].html.contains("Sofa (updated)"));
    assert!(sent[0].html.contains("https://cdn.test/102.jpg"));

    let seen = h.store.seen(SeenKind::Items).await;
    assert!(seen.contains("https://www.facebook.com/marketplace/item/101/"));
    assert!(seen.contains("https://www.facebook.com/marketplace/item/102/"));
}

#[tokio::test]
async fn test_marketplace_rescan_sends_nothing() {
    let h = harness().await;
    let page = FakePage::new(MARKETPLACE_URL, vec![marketplace_html(&[("101", "Sofa")])]);

    marketplace::scan(page.as_ref(), &h.ctx).await.unwrap();
    let second = marketplace::scan(page.as_ref(), &h.ctx).await.unwrap();

    assert_eq!(second.reported, 0);
    assert!(!second.email_sent);
    assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_marketplace_failed_delivery_still_records_items() {
    let h = harness_with(RecordingMailer::failing(), RecordingUploader::default(), true).await;
    let page = FakePage::new(MARKETPLACE_URL, vec![marketplace_html(&[("7", "Lamp")])]);

    let report = marketplace::scan(page.as_ref(), &h.ctx).await.unwrap();

    assert!(!report.email_sent);
    assert_eq!(report.new_ids, 1);
    assert!(h.store.seen(SeenKind::Items).await.contains("https://www.facebook.com/marketplace/item/7/"));
}

#[tokio::test]
async fn test_feed_reports_each_group_once() {
    let h = harness().await;
    let html = feed_html(&[
        feed_post(1, GROUP_A, "first_n.jpg"),
        feed_post(2, GROUP_A, "second_n.jpg"),
        feed_post(3, "https://www.facebook.com/groups/999/", "other_n.jpg"),
    ]);
    let page = FakePage::new(FEED_URL, vec![html]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.kind, ScanKind::Feed);
    assert_eq!(report.reported, 1);
    assert_eq!(report.new_ids, 2);
    assert!(report.email_sent);

    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains(GROUP_A));
    assert!(sent[0].body.contains("https://cdn.test/1.png"));
    assert!(!sent[0].body.contains("groups/999"));

    // Only the first post of the group was captured.
    assert_eq!(*page.captures.lock().unwrap(), vec!["1".to_string()]);
    assert_eq!(h.uploader.uploads.lock().unwrap()[0], b"png-1".to_vec());

    let seen = h.store.seen(SeenKind::PostIds).await;
    assert!(seen.contains("first_n.jpg"));
    assert!(seen.contains("second_n.jpg"));
    assert!(!seen.contains("other_n.jpg"));
}

#[tokio::test]
async fn test_feed_collects_posts_across_scrolls() {
    let h = harness().await;
    let first = feed_html(&[feed_post(1, GROUP_A, "a_n.jpg")]);
    let second = feed_html(&[feed_post(1, GROUP_A, "a_n.jpg"), feed_post(2, GROUP_B, "b_n.jpg")]);
    let page = FakePage::new(FEED_URL, vec![first, second]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.reported, 2);
    assert_eq!(report.new_ids, 2);
    let body = &h.mailer.sent()[0].body;
    assert!(body.contains(GROUP_A));
    assert!(body.contains(GROUP_B));
}

#[tokio::test]
async fn test_feed_scroll_failure_still_mails_collected_posts() {
    let h = harness().await;
    let page = FakePage::with_failing_scroll(FEED_URL, vec![feed_html(&[feed_post(1, GROUP_A, "a_n.jpg")])]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.new_ids, 1);
    assert_eq!(report.reported, 1);
    assert!(report.email_sent);
    let sent = h.mailer.sent();
    assert_eq!(sent.len(), 1);
    assert!(sent[0].body.contains(GROUP_A));
    assert!(h.store.seen(SeenKind::PostIds).await.contains("a_n.jpg"));

    // The recorded post is not reported a second time.
    let again = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();
    assert_eq!(again.reported, 0);
    assert_eq!(h.mailer.sent().len(), 1);
}

#[tokio::test]
async fn test_feed_skips_already_seen_images() {
    let h = harness().await;
    h.store.record_seen(SeenKind::PostIds, ["old_n.jpg"]).await.unwrap();
    let page = FakePage::new(FEED_URL, vec![feed_html(&[feed_post(1, GROUP_A, "old_n.jpg")])]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.reported, 0);
    assert!(h.mailer.sent().is_empty());
    assert!(page.captures.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_feed_upload_failure_reports_without_image() {
    let uploader = RecordingUploader {
        fail: true,
        ..Default::default()
    };
    let h = harness_with(RecordingMailer::default(), uploader, true).await;
    let page = FakePage::new(FEED_URL, vec![feed_html(&[feed_post(4, GROUP_B, "b_n.jpg")])]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.reported, 1);
    let sent = h.mailer.sent();
    assert!(sent[0].body.contains(GROUP_B));
    assert!(!sent[0].body.contains("Image:"));
}

#[tokio::test]
async fn test_feed_without_capture_skips_screenshots() {
    let h = harness_with(RecordingMailer::default(), RecordingUploader::default(), false).await;
    let page = FakePage::new(FEED_URL, vec![feed_html(&[feed_post(1, GROUP_A, "a_n.jpg")])]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.reported, 1);
    assert!(page.captures.lock().unwrap().is_empty());
    assert!(page.expanded.lock().unwrap().is_empty());
    assert!(h.uploader.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn test_feed_gives_up_when_no_posts_render() {
    let h = harness().await;
    let page = FakePage::new(FEED_URL, vec!["<html><body><p>loading</p></body></html>".to_string()]);

    let report = FeedScanner::new(page.as_ref(), &h.ctx).run().await.unwrap();

    assert_eq!(report.reported, 0);
    assert!(!report.email_sent);
    assert!(h.mailer.sent().is_empty());
}

#[tokio::test]
async fn test_run_scan_dispatches_by_kind() {
    let h = harness().await;
    let page = FakePage::new(MARKETPLACE_URL, vec![marketplace_html(&[("55", "Chair")])]);

    let report = run_scan(ScanKind::Marketplace, page.as_ref(), &h.ctx).await.unwrap();

    assert_eq!(report.kind, ScanKind::Marketplace);
    assert_eq!(report.reported, 1);
}
