// tests/notify_format.rs
use chrono::{TimeZone, Utc};
use content_monitor::notify::report::render_report;
use content_monitor::notify::{format_markdown, preview, subject, FileReportNotifier, Notifier, DEFAULT_MAX_BYTES};
use content_monitor::{Entry, Link, Update};

fn update(title: &str, summary: &str) -> Update {
    Update {
        source_name: "Chan".into(),
        source_address: "https://feed.test/UC1".into(),
        entry: Entry {
            id: title.to_lowercase(),
            source_name: "Chan".into(),
            title: title.into(),
            body: String::new(),
            published_at: Some(Utc.with_ymd_and_hms(2024, 3, 1, 9, 30, 0).unwrap()),
            link: Some(format!("https://watch.test/{}", title.to_lowercase())),
            text: String::new(),
            summary: summary.into(),
            outline: "1. first\n2. second".into(),
            captured_at: Utc::now(),
        },
        links: Vec::new(),
    }
}

#[test]
fn empty_batch_renders_nothing() {
    assert!(format_markdown("Updates", &[], DEFAULT_MAX_BYTES).is_none());
}

#[test]
fn sections_carry_fields_in_order() {
    let doc = format_markdown("Updates", &[update("Alpha", "about alpha"), update("Beta", "about beta")], DEFAULT_MAX_BYTES)
        .unwrap();
    assert!(doc.starts_with("## Updates\n\n"));
    assert!(doc.contains("**Published:** 2024-03-01 09:30 UTC"));
    assert!(doc.contains("[open](https://watch.test/alpha)"));
    assert!(doc.contains("1. first\n2. second"));
    assert!(doc.find("### Alpha").unwrap() < doc.find("### Beta").unwrap());
}

#[test]
fn related_links_are_capped() {
    let mut u = update("Page", "s");
    u.entry.published_at = None;
    u.links = (0..8)
        .map(|i| Link {
            title: if i == 0 { String::new() } else { format!("link {i}") },
            href: format!("https://blog.test/{i}"),
        })
        .collect();
    let doc = format_markdown("Updates", &[u], DEFAULT_MAX_BYTES).unwrap();
    assert!(doc.contains("(captured)"));
    assert!(doc.contains("- [https://blog.test/0](https://blog.test/0)"));
    assert!(doc.contains("link 4"));
    assert!(!doc.contains("link 5"));
}

#[test]
fn budget_drops_trailing_sections() {
    let updates: Vec<Update> = (0..10)
        .map(|i| update(&format!("Item{i}"), &"x".repeat(400)))
        .collect();
    let doc = format_markdown("Updates", &updates, 1_500).unwrap();
    assert!(doc.len() <= 1_500);
    assert!(doc.contains("### Item0"));
    assert!(!doc.contains("### Item9"));
}

#[test]
fn oversized_first_section_is_truncated_on_a_char_boundary() {
    let huge = "é".repeat(5_000);
    let doc = format_markdown("Updates", &[update("Huge", &huge)], 2_000).unwrap();
    assert!(doc.len() <= 2_000);
    assert!(doc.ends_with("(content truncated)"));
}

#[test]
fn oversized_section_without_room_is_skipped() {
    let doc = format_markdown("Updates", &[update("Huge", &"y".repeat(5_000))], 550);
    assert!(doc.is_none());
}

#[test]
fn subject_lines() {
    assert_eq!(subject(&[update("Alpha", "")]), "Chan: Alpha");
    assert_eq!(subject(&[update("A", ""), update("B", "")]), "2 new updates");
}

#[test]
fn preview_prefers_captions_and_is_bounded() {
    let mut u = update("Talk", "s");
    u.entry.body = "feed description".into();
    assert_eq!(preview(&u.entry, 100).as_deref(), Some("feed description"));

    u.entry.text = "caption   text\nacross lines and more".into();
    assert_eq!(preview(&u.entry, 12).as_deref(), Some("caption text..."));
    assert_eq!(preview(&u.entry, 0), None);

    u.entry.text.clear();
    u.entry.body.clear();
    assert_eq!(preview(&u.entry, 100), None);
}

#[test]
fn markdown_section_carries_a_short_preview() {
    let mut u = update("Talk", "s");
    u.entry.text = "ü".repeat(1_000);
    let doc = format_markdown("Updates", &[u], DEFAULT_MAX_BYTES).unwrap();
    assert!(doc.contains("**Preview:**"));
    assert!(doc.contains(&format!("> {}...", "ü".repeat(300))));
    assert!(!doc.contains(&"ü".repeat(301)));
}

#[test]
fn report_lists_every_field() {
    let mut u = update("Page", "page summary");
    u.entry.text = "x".repeat(1_200);
    u.links = (0..7)
        .map(|i| Link {
            title: if i == 0 { String::new() } else { format!("link {i}") },
            href: format!("https://blog.test/{i}"),
        })
        .collect();
    let at = Utc.with_ymd_and_hms(2024, 3, 2, 8, 0, 0).unwrap();
    let text = render_report(&[u, update("Beta", "")], at, 1_000);

    assert!(text.starts_with("Update report - 2024-03-02 08:00:00 UTC\n"));
    assert!(text.contains("Source: Chan\nPublished: 2024-03-01 09:30:00 UTC\nTitle: Page\n"));
    assert!(text.contains("Summary:\npage summary\n"));
    assert!(text.contains("Outline:\n1. first\n2. second\n"));
    assert!(text.contains(&format!("Preview:\n{}...\n", "x".repeat(1_000))));
    assert!(text.contains("- link: https://blog.test/0\n"));
    assert!(text.contains("- link 4: https://blog.test/4\n"));
    assert!(!text.contains("link 5"));
    assert_eq!(text.matches(&"=".repeat(60)).count(), 3);
}

#[tokio::test]
async fn report_notifier_writes_one_file_per_batch() {
    let dir = tempfile::tempdir().unwrap();
    let sink = FileReportNotifier::new(dir.path().join("reports"), 1_000);

    assert!(sink.write_report(&[]).await.unwrap().is_none());
    let path = sink.write_report(&[update("Alpha", "about alpha")]).await.unwrap().unwrap();
    let name = path.file_name().unwrap().to_string_lossy().to_string();
    assert!(name.starts_with("updates_") && name.ends_with(".txt"));
    let body = std::fs::read_to_string(&path).unwrap();
    assert!(body.contains("Title: Alpha"));

    sink.deliver(&[update("Beta", "about beta")]).await.unwrap();
    assert_eq!(std::fs::read_dir(sink.dir()).unwrap().count(), 2);
}
