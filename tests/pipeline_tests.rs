//! End-to-end runs over the in-memory browser and ledger

use std::path::PathBuf;

use chrono::{FixedOffset, TimeZone};

use seance_sync_lib::application::{FixedClock, ReconcileError, Reconciler, SeanceSyncService, SessionRunner};
use seance_sync_lib::domain::CompositeKey;
use seance_sync_lib::infrastructure::config::{AppConfig, Credential, CredentialSet, OrgSource, TimingConfig};
use seance_sync_lib::test_utils::{FakeBrowser, FakeLauncher, MemoryLedger};

const LOGIN_URL: &str = "https://portal.example.com/login";
const SHOWS_URL: &str = "https://portal.example.com/organizer/shows";
const LEDGER_HEADERS: [&str; 6] = ["Production", "Date", "Organization", "Sold", "Last Updated", "Notes"];

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.timing = TimingConfig {
        login_form_timeout_secs: 0,
        redirect_timeout_secs: 0,
        table_timeout_secs: 0,
        frame_timeout_secs: 0,
        poll_interval_ms: 1,
    };
    config.browser.screenshot_dir = PathBuf::from("screenshots");
    config.ledger.spreadsheet = "sheet-1".to_string();
    config
}

fn credentials() -> CredentialSet {
    CredentialSet::from(vec![
        Credential::new("USER1", "one@example.com", "pw-1"),
        Credential::new("USER2", "two@example.com", "pw-2"),
    ])
}

struct Seance<'a> {
    date: &'a str,
    sold: &'a str,
    producer: &'a str,
}

/// A portal with one login page, a shows page and one detail page per show
fn portal(login_ok: bool, shows: &[(&str, &[Seance<'_>])]) -> FakeBrowser {
    let target = if login_ok { SHOWS_URL } else { "https://portal.example.com/login?error=1" };
    let browser = FakeBrowser::with_page(
        LOGIN_URL,
        &format!(
            r#"<input type="email" id="email"><input type="password" id="password">
               <button type="submit" data-navigate="{target}">Sign in</button>"#
        ),
    );
    browser.add_page("https://portal.example.com/login?error=1", "<p>Invalid credentials</p>");

    let mut listing = String::from(r#"<div role="row"><span role="columnheader">Show</span></div>"#);
    for (i, (name, seances)) in shows.iter().enumerate() {
        let detail = format!("/organizer/shows/{i}");
        listing.push_str(&format!(
            r#"<div role="row"><span role="cell" data-label="Show">{name}</span><a href="{detail}">Details</a></div>"#
        ));

        let rows: String = seances
            .iter()
            .map(|s| {
                format!(
                    r#"<tr><td data-label="City">Istanbul</td><td data-label="Hall">Main</td>
                       <td data-label="Date">{}</td><td data-label="Time">20:00</td>
                       <td data-label="Sold">{}</td><td data-label="Available">3</td>
                       <td data-label="Producer">{}</td></tr>"#,
                    s.date, s.sold, s.producer
                )
            })
            .collect();
        let frame_url = format!("https://portal.example.com/frames/{i}");
        browser.add_page(
            &format!("https://portal.example.com{detail}"),
            &format!(r#"<iframe id="contentFrame" data-src="{frame_url}"></iframe>"#),
        );
        browser.add_page(&frame_url, &format!("<table><tbody>{rows}</tbody></table>"));
    }
    browser.add_page(SHOWS_URL, &listing);
    browser
}

fn reconciler(config: &AppConfig) -> Reconciler<FixedClock> {
    let offset = FixedOffset::east_opt(3 * 3600).unwrap();
    Reconciler::new(
        config.ledger.target_org_label.clone(),
        config.ledger.timestamp_format.clone(),
        FixedClock(offset.with_ymd_and_hms(2025, 1, 5, 9, 30, 0).unwrap()),
    )
}

fn service(
    config: &AppConfig,
    browsers: Vec<FakeBrowser>,
    ledger: &MemoryLedger,
) -> SeanceSyncService<FakeLauncher, MemoryLedger, FixedClock> {
    let runner = SessionRunner::new(FakeLauncher::new(browsers), config).unwrap();
    SeanceSyncService::new(runner, ledger.clone(), config.ledger.clone(), reconciler(config))
}

const SHOW_A_SLASH: &[Seance<'static>] = &[Seance {
    date: "01/01/2025",
    sold: "40",
    producer: "Bravo",
}];
const SHOW_A_PERIOD: &[Seance<'static>] = &[Seance {
    date: "01.01.2025",
    sold: "99",
    producer: "Bravo",
}];

#[tokio::test]
async fn test_overlapping_sessions_update_ledger_once() {
    let config = config();
    let ledger = MemoryLedger::with_tab(
        "Seances",
        &LEDGER_HEADERS,
        &[
            &["Show A", "01.01.2025", "Bravo", "0", "", ""],
            &["Show B", "02/01/2025", "Bravo", "0", "", ""],
        ],
    );
    let first = portal(true, &[("Show A", SHOW_A_SLASH)]);
    let second = portal(
        true,
        &[
            ("Show A", SHOW_A_PERIOD),
            (
                "Show C",
                &[Seance {
                    date: "03.01.2025",
                    sold: "5",
                    producer: "Bravo",
                }],
            ),
        ],
    );

    let summary = service(&config, vec![first.clone(), second.clone()], &ledger)
        .run(&credentials())
        .await
        .unwrap();

    assert_eq!(summary.sessions.len(), 2);
    assert!(!summary.has_failures());
    assert_eq!(summary.unique_records, 2);
    assert_eq!(summary.merged_duplicates, vec![CompositeKey::new("Show A", "01/01/2025")]);
    assert_eq!(summary.report.updated_count, 1);
    assert_eq!(summary.report.unmatched, vec![CompositeKey::new("Show C", "03/01/2025")]);

    // first session's record wins
    assert_eq!(
        ledger.writes(),
        vec![(2, 4, "40".to_string()), (2, 5, "05/01/2025 09:30:00".to_string())]
    );
    assert_eq!(ledger.row_count("Seances"), 2);
    assert_eq!(first.quit_count(), 1);
    assert_eq!(second.quit_count(), 1);
    assert_eq!(second.typed_into("email").as_deref(), Some("two@example.com"));
}

#[tokio::test]
async fn test_failed_login_is_isolated_and_reported() {
    let config = config();
    let ledger = MemoryLedger::with_tab("Seances", &LEDGER_HEADERS, &[&["Show A", "01/01/2025", "Bravo", "0", "", ""]]);
    let first = portal(false, &[]);
    let second = portal(true, &[("Show A", SHOW_A_SLASH)]);

    let summary = service(&config, vec![first.clone(), second], &ledger)
        .run(&credentials())
        .await
        .unwrap();

    assert!(summary.has_failures());
    assert_eq!(summary.failed.len(), 1);
    assert_eq!(summary.failed[0].identity, "USER1");
    assert_eq!(first.screenshots(), vec![PathBuf::from("screenshots/login_failed_USER1.png")]);
    assert_eq!(first.quit_count(), 1);

    assert_eq!(summary.sessions.len(), 1);
    assert_eq!(summary.report.updated_count, 1);
    assert!(summary.render_table().contains("FAILED"));
}

#[tokio::test]
async fn test_all_sessions_failed_leaves_ledger_untouched() {
    let config = config();
    // no tab: opening the ledger would fail
    let ledger = MemoryLedger::default();

    let summary = service(&config, vec![portal(false, &[]), portal(false, &[])], &ledger)
        .run(&credentials())
        .await
        .unwrap();

    assert_eq!(summary.failed.len(), 2);
    assert_eq!(summary.unique_records, 0);
    assert!(ledger.writes().is_empty());
}

#[tokio::test]
async fn test_page_org_source_reconciles_only_target_producer() {
    let mut config = config();
    config.schema.org_source = OrgSource::Page;
    config.ledger.target_org_label = "Bravo Productions".to_string();

    let ledger = MemoryLedger::with_tab(
        "Seances",
        &LEDGER_HEADERS,
        &[
            &["Show", "01/01/2025", "Bravo", "0", "", ""],
            &["Show B", "02/01/2025", "Bravo", "0", "", ""],
        ],
    );
    let browser = portal(
        true,
        &[
            (
                "Show A",
                &[Seance {
                    date: "01.01.2025",
                    sold: "57",
                    producer: "Bravo Productions",
                }],
            ),
            (
                "Show B",
                &[Seance {
                    date: "02.01.2025",
                    sold: "8",
                    producer: "OtherPromoter",
                }],
            ),
        ],
    );

    let only_user1 = CredentialSet::from(vec![Credential::new("USER1", "one@example.com", "pw-1")]);
    let summary = service(&config, vec![browser], &ledger).run(&only_user1).await.unwrap();

    assert_eq!(summary.report.updated_count, 1);
    assert!(summary.report.unmatched.is_empty());
    assert_eq!(summary.report.skipped_other_org, 1);
    assert_eq!(ledger.writes()[0], (2, 4, "57".to_string()));
}

#[tokio::test]
async fn test_ledger_without_required_column_aborts_reconciliation() {
    let config = config();
    let ledger = MemoryLedger::with_tab(
        "Seances",
        &["Production", "Date", "Organization", "Sold"],
        &[&["Show A", "01/01/2025", "Bravo", "0"]],
    );

    let result = service(&config, vec![portal(true, &[("Show A", SHOW_A_SLASH)])], &ledger)
        .run(&CredentialSet::from(vec![Credential::new("USER1", "one@example.com", "pw-1")]))
        .await;

    assert!(matches!(result, Err(ReconcileError::MissingColumn { column }) if column == "Last Updated"));
    assert!(ledger.writes().is_empty());
}
