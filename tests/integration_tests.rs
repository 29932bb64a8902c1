use chrono::{TimeZone, Utc};
use std::time::Duration;
use tempfile::TempDir;
use tokio::task::LocalSet;
use yt_feed_filter::extract::parse_duration_to_seconds;
use yt_feed_filter::monitor::{self, FeedMonitor, MonitorTimings};
use yt_feed_filter::settings::{
    watch_settings_file, ConfigGateway, MemorySettingsStore, SettingsStore, TomlSettingsStore,
    SETTINGS_APPLIED,
};
use yt_feed_filter::{
    ActiveConfig, CardKey, Disposition, FilterMessage, FilterSettings, FixedClock, Page, PageEdit,
    PartialSettings, RuleClassifier, ScanDriver, SectionId, SelectorExtractor, StyleRenderer,
    SuppressReason, SuppressStyle,
};

type Driver = ScanDriver<SelectorExtractor, RuleClassifier, StyleRenderer>;

const FEED_URL: &str = "https://www.youtube.com/";

fn driver() -> Driver {
    ScanDriver::standard()
        .unwrap()
        .with_clock(FixedClock(Utc.with_ymd_and_hms(2024, 6, 1, 12, 0, 0).unwrap()))
}

fn card(title: &str, duration: &str, watched_pct: u32, uploaded: &str) -> String {
    format!(
        r#"<ytd-rich-item-renderer>
             <a id="thumbnail"><div id="time-status"><span>{duration}</span></div>
               <div class="ytThumbnailOverlayProgressBarHostWatchedProgressBarSegment" style="width: {watched_pct}%"></div>
             </a>
             <a id="video-title">{title}</a>
             <div id="metadata-line"><span>1K views</span><span>{uploaded}</span></div>
           </ytd-rich-item-renderer>"#
    )
}

fn grid(cards: &[String]) -> String {
    format!(
        "<ytd-rich-grid-renderer><div id=\"contents\">{}</div></ytd-rich-grid-renderer>",
        cards.concat()
    )
}

fn key(ordinal: usize) -> CardKey {
    CardKey {
        section: SectionId(0),
        ordinal,
    }
}

fn settings(partial: &str) -> FilterSettings {
    let partial: PartialSettings = serde_json::from_str(partial).unwrap();
    FilterSettings::default().merged(&partial)
}

#[test]
fn test_duration_parsing() {
    assert_eq!(parse_duration_to_seconds("1:02:03"), Some(3723));
    assert_eq!(parse_duration_to_seconds("9:05"), Some(545));
    assert_eq!(parse_duration_to_seconds("LIVE"), None);
    assert_eq!(parse_duration_to_seconds("SHORTS"), None);
    assert_eq!(parse_duration_to_seconds(""), None);
}

#[test]
fn test_filter_rules_outrank_watched_in_page() {
    let mut page = Page::from_html(FEED_URL, &card("Official Mix", "10:00", 95, "1 day ago"));
    let active = ActiveConfig::new(settings(
        r#"{"minDurationMinutes":0,"maxDurationMinutes":120,"titleKeywords":["mix"],"watchedThreshold":10,"hideStyle":"hide"}"#,
    ));
    let mut driver = driver();
    driver.scan(&mut page, &active).unwrap();

    let rows = driver.rows(&page);
    assert_eq!(
        rows[0].disposition,
        Disposition::Suppressed {
            style: SuppressStyle::Hide,
            reason: SuppressReason::Keyword
        }
    );
    assert!(page.style(key(0)).is_hidden());
}

#[test]
fn test_rescan_is_idempotent() {
    let html = [
        card("a talk", "20:00", 0, "1 day ago"),
        card("a mix", "20:00", 0, "1 day ago"),
    ]
    .concat();
    let mut page = Page::from_html(FEED_URL, &html);
    let active = ActiveConfig::new(settings(r#"{"hideStyle":"hide"}"#));
    let mut driver = driver();

    driver.scan(&mut page, &active).unwrap();
    let once = (page.style(key(0)), page.style(key(1)));

    assert_eq!(driver.scan(&mut page, &active).unwrap().processed, 0);
    driver.reset();
    assert_eq!(driver.scan(&mut page, &active).unwrap().processed, 2);
    assert_eq!((page.style(key(0)), page.style(key(1))), once);
    assert!(once.1.is_hidden());
}

#[test]
fn test_recency_sort_is_stable() {
    let html = [
        card("first", "20:00", 0, "2 hours ago"),
        card("second", "20:00", 0, "2 hours ago"),
        card("oldest", "20:00", 0, "1 day ago"),
    ]
    .concat();
    let mut page = Page::from_html(FEED_URL, &html);
    let active = ActiveConfig::new(settings(r#"{"sortByDate":true}"#));
    let mut driver = driver();
    driver.scan(&mut page, &active).unwrap();

    let orders: Vec<Option<usize>> = (0..3).map(|i| page.style(key(i)).order).collect();
    assert_eq!(orders, vec![Some(0), Some(1), Some(2)]);
}

#[test]
fn test_unknown_duration_policy() {
    let html = card("a stream", "[no duration]", 0, "1 day ago");

    let mut page = Page::from_html(FEED_URL, &html);
    let mut driver = driver();
    driver
        .scan(&mut page, &ActiveConfig::new(settings(r#"{"hideUnknownDurations":true}"#)))
        .unwrap();
    assert_eq!(driver.rows(&page)[0].disposition.reason(), Some(SuppressReason::UnknownDuration));

    let mut page = Page::from_html(FEED_URL, &html);
    let mut driver = self::driver();
    driver
        .scan(&mut page, &ActiveConfig::new(settings(r#"{"hideUnknownDurations":false}"#)))
        .unwrap();
    assert_eq!(driver.rows(&page)[0].disposition, Disposition::Visible);
}

#[test]
fn test_single_card_mutation_is_debounced_but_grid_swap_is_immediate() {
    let t0 = std::time::Instant::now();
    let mut monitor = FeedMonitor::new(Page::new(FEED_URL), driver(), FilterSettings::default());
    monitor.start(t0);
    monitor.fire_due(t0 + Duration::from_millis(200));
    let baseline = monitor.stats().clone();

    monitor.handle(
        monitor::MonitorEvent::Page(PageEdit::Append(card("one", "20:00", 0, "1 day ago"))),
        t0 + Duration::from_millis(210),
    );
    assert_eq!(monitor.stats().scans, baseline.scans);
    assert_eq!(monitor.stats().resets, baseline.resets);

    monitor.handle(
        monitor::MonitorEvent::Page(PageEdit::ReplaceFeed(grid(&[card(
            "two",
            "20:00",
            0,
            "1 day ago",
        )]))),
        t0 + Duration::from_millis(220),
    );
    assert_eq!(monitor.stats().scans, baseline.scans + 1);
    assert_eq!(monitor.stats().resets, baseline.resets + 1);
    assert_eq!(monitor.next_deadline(), Some(t0 + Duration::from_millis(460)));

    // The debounce, the pending startup retry and the settle scan follow.
    monitor.fire_due(t0 + Duration::from_millis(720));
    assert_eq!(monitor.stats().scans, baseline.scans + 4);
    assert_eq!(monitor.stats().last_report.map(|r| r.total_cards), Some(1));
}

#[tokio::test]
async fn test_settings_merge_and_fallback() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.toml");
    tokio::fs::write(&path, "[ytf_settings]\nwatchedThreshold = 50\ntitleKeywords = [\"asmr\"]\n")
        .await
        .unwrap();

    let gateway = ConfigGateway::new(std::sync::Arc::new(TomlSettingsStore::new(&path)));
    let loaded = gateway.load_configuration().await;
    assert_eq!(loaded.watched_threshold, 50.0);
    assert_eq!(loaded.title_keywords, vec!["asmr"]);
    assert_eq!(loaded.min_duration_minutes, 10.0);

    tokio::fs::write(&path, "not = [valid").await.unwrap();
    assert_eq!(gateway.load_configuration().await, FilterSettings::default());
}

#[tokio::test(start_paused = true)]
async fn test_update_filters_through_handle() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let page = Page::from_html(
                FEED_URL,
                &[
                    card("a talk", "20:00", 0, "1 day ago"),
                    card("b talk", "40:00", 0, "1 day ago"),
                ]
                .concat(),
            );
            let (handle, task) =
                monitor::spawn(FeedMonitor::new(page, driver(), FilterSettings::default()));

            tokio::time::sleep(Duration::from_millis(250)).await;
            let before = handle.snapshot().await.unwrap();
            assert_eq!(before.stats.last_report.map(|r| r.processed), Some(2));

            let message = FilterMessage::from_json(
                r#"{"action":"updateFilters","settings":{"maxDurationMinutes":30}}"#,
            )
            .unwrap();
            let reply = handle.deliver(message).await.unwrap();
            assert_eq!(reply.status, SETTINGS_APPLIED);

            let after = handle.snapshot().await.unwrap();
            assert!(after.generation > before.generation);
            assert_eq!(after.stats.last_report.map(|r| r.processed), Some(2));
            assert_eq!(handle.settings().await.unwrap().max_duration_minutes, Some(30.0));

            let rows = handle.rows().await.unwrap();
            assert_eq!(rows[0].disposition, Disposition::Visible);
            assert_eq!(rows[1].disposition.reason(), Some(SuppressReason::TooLong));

            task.shutdown().await.unwrap();
            assert!(handle.settings().await.is_err());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_url_change_forces_reapply() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let page = Page::from_html(FEED_URL, &card("a talk", "20:00", 0, "1 day ago"));
            let (handle, task) =
                monitor::spawn(FeedMonitor::new(page, driver(), FilterSettings::default()));
            tokio::time::sleep(Duration::from_millis(250)).await;
            let resets = handle.snapshot().await.unwrap().stats.resets;

            handle
                .send(PageEdit::Navigate("https://www.youtube.com/feed/subscriptions".to_string()))
                .await
                .unwrap();
            let snapshot = handle.snapshot().await.unwrap();
            assert_eq!(snapshot.url, "https://www.youtube.com/feed/subscriptions");
            assert_eq!(snapshot.stats.resets, resets + 1);

            handle.navigate_finished().await.unwrap();
            assert_eq!(handle.snapshot().await.unwrap().stats.resets, resets + 2);

            let monitor = task.shutdown().await.unwrap();
            assert!(!monitor.is_observing());
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_startup_retry_gives_up() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let monitor = FeedMonitor::new(Page::new(FEED_URL), driver(), FilterSettings::default())
                .with_timings(MonitorTimings {
                    retry_attempts: 5,
                    ..Default::default()
                });
            let (handle, task) = monitor::spawn(monitor);

            tokio::time::sleep(Duration::from_secs(10)).await;
            let snapshot = handle.snapshot().await.unwrap();
            assert_eq!(snapshot.stats.startup_attempts, 5);
            assert_eq!(snapshot.stats.scans, 6);
            assert_eq!(snapshot.total_cards, 0);

            task.shutdown().await.unwrap();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_twice_and_mutations_after_stop() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let page = Page::from_html(FEED_URL, &grid(&[card("first", "20:00", 0, "1 day ago")]));
            let (handle, task) =
                monitor::spawn(FeedMonitor::new(page, driver(), FilterSettings::default()));
            tokio::time::sleep(Duration::from_millis(250)).await;

            handle.stop().await.unwrap();
            handle.stop().await.unwrap();
            handle
                .send(PageEdit::Append(card("late", "20:00", 0, "1 day ago")))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_secs(1)).await;

            let snapshot = handle.snapshot().await.unwrap();
            assert!(!snapshot.observing);
            assert_eq!(snapshot.total_cards, 2);
            assert_eq!(handle.rows().await.unwrap().len(), 1);

            handle.reapply().await.unwrap();
            assert_eq!(handle.rows().await.unwrap().len(), 2);

            task.shutdown().await.unwrap();
        })
        .await;
}

#[tokio::test(start_paused = true)]
async fn test_infinite_scroll_is_incremental() {
    let local = LocalSet::new();
    local
        .run_until(async {
            let page = Page::from_html(FEED_URL, &grid(&[card("first", "20:00", 0, "1 day ago")]));
            let (handle, task) =
                monitor::spawn(FeedMonitor::new(page, driver(), FilterSettings::default()));
            tokio::time::sleep(Duration::from_millis(250)).await;

            handle
                .send(PageEdit::Append(
                    [
                        card("second", "20:00", 0, "1 day ago"),
                        card("third", "20:00", 50, "1 day ago"),
                    ]
                    .concat(),
                ))
                .await
                .unwrap();
            tokio::time::sleep(Duration::from_millis(300)).await;

            let snapshot = handle.snapshot().await.unwrap();
            let report = snapshot.stats.last_report.unwrap();
            assert_eq!(report.processed, 2);
            assert_eq!(report.total_cards, 3);
            assert_eq!(report.dimmed, 1);

            task.shutdown().await.unwrap();
        })
        .await;
}

#[tokio::test]
async fn test_settings_file_changes_reach_monitor() {
    let temp_dir = TempDir::new().unwrap();
    let path = temp_dir.path().join("settings.toml");
    let store = TomlSettingsStore::new(&path);
    store.save(&FilterSettings::default()).await.unwrap();

    let local = LocalSet::new();
    local
        .run_until(async {
            let monitor = FeedMonitor::new(Page::new(FEED_URL), driver(), FilterSettings::default());
            let (handle, task) = monitor::spawn(monitor);
            let (changes, watcher) = watch_settings_file(store.clone(), Duration::from_millis(20));
            let forwarder = monitor::forward_settings(handle.clone(), changes);

            // Coarse mtime resolution on some filesystems
            tokio::time::sleep(Duration::from_millis(1100)).await;
            store
                .save(&FilterSettings {
                    sort_by_date: true,
                    ..Default::default()
                })
                .await
                .unwrap();

            let mut applied = false;
            for _ in 0..100 {
                tokio::time::sleep(Duration::from_millis(20)).await;
                if handle.settings().await.unwrap().sort_by_date {
                    applied = true;
                    break;
                }
            }
            assert!(applied);

            watcher.abort();
            forwarder.abort();
            task.shutdown().await.unwrap();
        })
        .await;
}

#[tokio::test]
async fn test_memory_store_roundtrip_through_gateway() {
    let store = std::sync::Arc::new(MemorySettingsStore::default());
    let gateway = ConfigGateway::new(store.clone());
    let settings = FilterSettings {
        hide_style: SuppressStyle::Hide,
        ..Default::default()
    };
    gateway.save(&settings).await.unwrap();
    assert_eq!(store.load().await.unwrap().hide_style, Some(SuppressStyle::Hide));
    assert_eq!(gateway.load_configuration().await, settings);
}
