//! Integration tests for the refresh lifecycle: parse, reconcile, retain.
//!
//! Each test creates its own in-memory SQLite database and drives
//! `parse_feed` end-to-end against it.

use chrono::{DateTime, Duration, Utc};
use feedsync::content::{HttpImageFetcher, ImageFetch};
use feedsync::feed::{parse_feed, resolve_image_placeholders, FeedContext, ParseOutcome};
use feedsync::storage::{Database, EntryStore, NewEntry};
use feedsync::util::HostPolicy;
use pretty_assertions::assert_eq;
use std::path::{Path, PathBuf};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

/// Image fetcher for tests that must not touch the network.
struct NoImages;

impl ImageFetch for NoImages {
    async fn fetch_and_store(&self, _url: &str, _path: &Path) -> bool {
        false
    }
}

async fn db_with_feed() -> (Database, i64) {
    let db = Database::open(":memory:").await.unwrap();
    let id = db
        .insert_feed("https://example.com/feed.xml", None)
        .await
        .unwrap();
    (db, id)
}

async fn context_for(db: &Database, feed_id: i64, images_dir: PathBuf) -> FeedContext {
    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    FeedContext::for_feed(&feed, Duration::hours(48), images_dir, false)
}

fn rfc822(date: DateTime<Utc>) -> String {
    date.format("%a, %d %b %Y %H:%M:%S GMT").to_string()
}

fn rss(items: &[(&str, &str, DateTime<Utc>)]) -> String {
    let items: String = items
        .iter()
        .map(|(title, link, date)| {
            format!(
                "<item><title>{title}</title><link>{link}</link>\
                 <description>About {title}</description><pubDate>{}</pubDate></item>",
                rfc822(*date)
            )
        })
        .collect();
    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<rss version="2.0"><channel><title>Example News</title>{items}</channel></rss>"#
    )
}

fn hours_ago(hours: i64) -> DateTime<Utc> {
    Utc::now() - Duration::hours(hours)
}

// ============================================================================
// Parse + Reconcile
// ============================================================================

#[tokio::test]
async fn test_first_refresh_stores_fresh_entries_and_stops_at_stale() {
    let (db, feed_id) = db_with_feed().await;
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let xml = rss(&[
        ("Newest", "https://example.com/3", hours_ago(1)),
        ("Newer", "https://example.com/2", hours_ago(2)),
        ("Ancient", "https://example.com/1", hours_ago(100)),
        ("Out of order", "https://example.com/0", hours_ago(1)),
    ]);

    let outcome = parse_feed(xml.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    assert_eq!(outcome, ParseOutcome { new_count: 2, done: true });
    let titles: Vec<String> = db
        .get_entries_for_feed(feed_id, None)
        .await
        .unwrap()
        .iter()
        .map(|e| e.title.to_string())
        .collect();
    assert_eq!(titles, vec!["Newest".to_string(), "Newer".to_string()]);

    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    assert_eq!(feed.display_title(), "Example News");
    assert!(feed.last_update.unwrap() < Utc::now().timestamp());
    assert_eq!(feed.unread_count, 2);
}

#[tokio::test]
async fn test_refresh_twice_adds_only_newer_entries() {
    let (db, feed_id) = db_with_feed().await;
    let first = rss(&[("One", "https://example.com/1", hours_ago(3))]);
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    parse_feed(first.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    // The stored last_update is "now", so the next document must carry an
    // entry from the future to count as new.
    let second = rss(&[
        ("Two", "https://example.com/2", Utc::now() + Duration::minutes(5)),
        ("One", "https://example.com/1", hours_ago(3)),
    ]);
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let outcome = parse_feed(second.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    assert_eq!(outcome, ParseOutcome { new_count: 1, done: true });
    assert_eq!(db.get_entries_for_feed(feed_id, None).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_republished_entry_updates_in_place_and_resurfaces() {
    let (db, feed_id) = db_with_feed().await;
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let first = rss(&[("Draft title", "https://example.com/post", hours_ago(5))]);
    parse_feed(first.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    let entry_id = db.get_entries_for_feed(feed_id, None).await.unwrap()[0].id;
    db.mark_entry_read(entry_id).await.unwrap();

    let republished = rss(&[("Final title", "https://example.com/post", hours_ago(1))]);
    let outcome = parse_feed(republished.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    assert_eq!(outcome.new_count, 0);
    let entries = db.get_entries_for_feed(feed_id, None).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].id, entry_id);
    assert_eq!(&*entries[0].title, "Final title");
    assert!(!entries[0].is_read(), "a new date clears the read marker");
}

#[tokio::test]
async fn test_user_title_survives_refresh() {
    let db = Database::open(":memory:").await.unwrap();
    let feed_id = db
        .insert_feed("https://example.com/feed.xml", Some("My Name"))
        .await
        .unwrap();
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let xml = rss(&[("One", "https://example.com/1", hours_ago(1))]);

    parse_feed(xml.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    let feed = db.get_feed(feed_id).await.unwrap().unwrap();
    assert_eq!(feed.display_title(), "My Name");
}

// ============================================================================
// Retention
// ============================================================================

#[tokio::test]
async fn test_retention_sweep_spares_favorites() {
    let (db, feed_id) = db_with_feed().await;
    let old = hours_ago(24 * 10);
    db.insert(
        feed_id,
        &NewEntry {
            link: "https://example.com/old",
            title: "Old",
            description: None,
            date: old,
        },
    )
    .await
    .unwrap();
    let favorite = db
        .insert(
            feed_id,
            &NewEntry {
                link: "https://example.com/keeper",
                title: "Keeper",
                description: None,
                date: old,
            },
        )
        .await
        .unwrap();
    db.toggle_entry_favorite(favorite).await.unwrap();

    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let empty = r#"<rss version="2.0"><channel><title>Quiet</title></channel></rss>"#;
    parse_feed(empty.as_bytes(), &ctx, &db, &NoImages).await.unwrap();

    let remaining = db.get_entries_for_feed(feed_id, None).await.unwrap();
    assert_eq!(remaining.len(), 1);
    assert_eq!(remaining[0].id, favorite);
}

// ============================================================================
// Formats
// ============================================================================

#[tokio::test]
async fn test_atom_and_rdf_documents() {
    let (db, feed_id) = db_with_feed().await;
    let ctx = context_for(&db, feed_id, PathBuf::from("/unused")).await;
    let updated = hours_ago(1).format("%Y-%m-%dT%H:%M:%S%.3fZ");
    let atom = format!(
        r#"<?xml version="1.0" encoding="utf-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>Atom Example</title>
  <link href="https://example.com/"/>
  <entry>
    <title>Atom entry</title>
    <link href="https://example.com/atom/1"/>
    <updated>{updated}</updated>
    <content type="html">&lt;p&gt;Hello&lt;/p&gt;</content>
  </entry>
</feed>"#
    );

    let outcome = parse_feed(atom.as_bytes(), &ctx, &db, &NoImages).await.unwrap();
    assert_eq!(outcome.new_count, 1);

    let date = hours_ago(2).format("%Y-%m-%dT%H:%M:%S+00:00");
    let rdf = format!(
        r#"<?xml version="1.0"?>
<rdf:RDF xmlns:rdf="http://www.w3.org/1999/02/22-rdf-syntax-ns#"
         xmlns="http://purl.org/rss/1.0/"
         xmlns:dc="http://purl.org/dc/elements/1.1/">
  <channel><title>RDF Example</title></channel>
  <item>
    <title>RDF entry</title>
    <link>https://example.com/rdf/1</link>
    <dc:date>{date}</dc:date>
  </item>
</rdf:RDF>"#
    );

    let outcome = parse_feed(rdf.as_bytes(), &ctx, &db, &NoImages).await.unwrap();
    assert_eq!(outcome, ParseOutcome { new_count: 1, done: true });

    let entries = db.get_entries_for_feed(feed_id, None).await.unwrap();
    let atom_entry = entries
        .iter()
        .find(|e| e.link == "https://example.com/atom/1")
        .unwrap();
    assert_eq!(atom_entry.description.as_deref(), Some("<p>Hello</p>"));
}

// ============================================================================
// Images
// ============================================================================

#[tokio::test]
async fn test_new_entry_images_are_cached_under_entry_id() {
    let mock_server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/media/pic.png"))
        .respond_with(ResponseTemplate::new(200).set_body_bytes(b"png-bytes".to_vec()))
        .expect(1)
        .mount(&mock_server)
        .await;

    let images_dir = tempfile::tempdir().unwrap();
    let (db, feed_id) = db_with_feed().await;
    let mut ctx = context_for(&db, feed_id, images_dir.path().to_path_buf()).await;
    ctx.fetch_images = true;

    let xml = format!(
        r#"<rss version="2.0"><channel><title>Pictures</title>
<item>
  <title>With image</title>
  <link>https://example.com/pic</link>
  <pubDate>{}</pubDate>
  <description><![CDATA[<p><img src="{}/media/pic.png" alt="pic"></p>]]></description>
</item>
</channel></rss>"#,
        rfc822(hours_ago(1)),
        mock_server.uri()
    );

    let fetcher = HttpImageFetcher::new(reqwest::Client::new(), std::time::Duration::from_secs(5))
        .with_host_policy(HostPolicy::AllowPrivate);
    let outcome = parse_feed(xml.as_bytes(), &ctx, &db, &fetcher).await.unwrap();
    assert_eq!(outcome.new_count, 1);

    let entry = &db.get_entries_for_feed(feed_id, None).await.unwrap()[0];
    let cached = images_dir.path().join(format!("{}__pic.png", entry.id));
    assert_eq!(std::fs::read(&cached).unwrap(), b"png-bytes".to_vec());

    let stored = entry.description.as_deref().unwrap();
    assert!(!stored.contains(&mock_server.uri()));
    let resolved = resolve_image_placeholders(stored, entry.id);
    assert!(resolved.contains(&format!("file://{}", cached.display())));
}
