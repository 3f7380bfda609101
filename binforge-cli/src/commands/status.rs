//! `binforge status`: what the metadata store currently records.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use serde::Serialize;
use tabled::{settings::Style, Table, Tabled};

use binforge_core::{clock, store, MetadataStore, Platform, SubjectProfile};

use super::StageContext;

/// Arguments for `binforge status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self, ctx: &StageContext) -> Result<()> {
        let store = store::load_at(&ctx.metadata, &ctx.profile)
            .with_context(|| format!("failed to load {}", ctx.metadata.display()))?;
        let report = build_report(&ctx.profile, &store, Utc::now());
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(&ctx.profile, report);
        Ok(())
    }
}

#[derive(Debug, Serialize)]
struct StatusReport {
    family: String,
    last_sync: Option<String>,
    last_sync_age: String,
    records: Vec<RecordStatus>,
}

#[derive(Debug, Serialize)]
struct RecordStatus {
    key: String,
    /// Stored value of the profile's freshness field.
    current: String,
    builds: Vec<BuildStatus>,
}

#[derive(Debug, Serialize)]
struct BuildStatus {
    platform: String,
    filename: String,
    /// `None` when the store never recorded a build time.
    last_build: Option<String>,
    age: String,
    hashes: BTreeMap<String, String>,
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "key")]
    key: String,
    #[tabled(rename = "current")]
    current: String,
    #[tabled(rename = "platform")]
    platform: String,
    #[tabled(rename = "filename")]
    filename: String,
    #[tabled(rename = "built")]
    built: String,
}

fn build_report(profile: &SubjectProfile, store: &MetadataStore, now: DateTime<Utc>) -> StatusReport {
    let records = store
        .records
        .iter()
        .map(|(key, record)| RecordStatus {
            key: key.to_string(),
            current: record.release_str(&profile.freshness_field).to_string(),
            builds: record
                .builds
                .iter()
                .map(|(platform, build)| BuildStatus {
                    platform: platform.to_string(),
                    filename: build.filename.clone(),
                    last_build: build.last_build.map(clock::to_iso),
                    age: build
                        .last_build
                        .map(|ts| clock::format_age(ts, now))
                        .unwrap_or_else(|| "unknown".to_string()),
                    hashes: build.hashes.clone(),
                })
                .collect(),
        })
        .collect();

    StatusReport {
        family: profile.family.to_string(),
        last_sync: store.last_sync.map(clock::to_iso),
        last_sync_age: store
            .last_sync
            .map(|ts| clock::format_age(ts, now))
            .unwrap_or_else(|| "never".to_string()),
        records,
    }
}

fn print_table(profile: &SubjectProfile, report: StatusReport) {
    let builds: usize = report.records.iter().map(|r| r.builds.len()).sum();
    println!(
        "binforge v{} | {} | {} records | {} builds | last sync {}",
        env!("CARGO_PKG_VERSION"),
        report.family,
        report.records.len(),
        builds,
        report.last_sync_age,
    );

    if report.records.is_empty() {
        println!("No versions recorded.");
        return;
    }

    let mut rows = Vec::new();
    for record in report.records {
        if record.builds.is_empty() {
            rows.push(StatusTableRow {
                key: record.key.bold().to_string(),
                current: record.current,
                platform: "-".to_string(),
                filename: "not built".red().to_string(),
                built: "-".to_string(),
            });
            continue;
        }
        for build in record.builds {
            let configured = profile
                .runner_for(&Platform::from(build.platform.as_str()))
                .is_some();
            let built = if configured {
                build.age
            } else {
                format!("{} (unconfigured platform)", build.age).yellow().to_string()
            };
            rows.push(StatusTableRow {
                key: record.key.bold().to_string(),
                current: record.current.clone(),
                platform: build.platform,
                filename: build.filename,
                built,
            });
        }
    }

    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
}

#[cfg(test)]
mod tests {
    use super::*;
    use binforge_core::{BuildEntry, Family, SubjectKey, VersionRecord};
    use chrono::{Duration, TimeZone};
    use serde_json::json;

    #[test]
    fn report_lists_builds_with_ages() {
        let profile = SubjectProfile::builtin(Family::Runtime);
        let now = Utc.with_ymd_and_hms(2025, 6, 10, 0, 0, 0).unwrap();
        let mut record = VersionRecord::default();
        record
            .release
            .insert("releaseDate".to_string(), json!("2025-06-05"));
        record.builds.insert(
            Platform::from("macos-aarch64"),
            BuildEntry {
                filename: "php-8.4.tar.gz".to_string(),
                hashes: BTreeMap::from([("sha512".to_string(), "aa".to_string())]),
                last_build: Some(now - Duration::days(3)),
            },
        );
        record.builds.insert(
            Platform::from("linux-x86_64"),
            BuildEntry {
                filename: "php-8.4-linux.tar.gz".to_string(),
                hashes: BTreeMap::new(),
                last_build: None,
            },
        );
        let mut store = MetadataStore::default();
        store.records.insert(SubjectKey::from("8.4"), record);
        store
            .records
            .insert(SubjectKey::from("8.5"), VersionRecord::default());

        let report = build_report(&profile, &store, now);
        assert_eq!(report.last_sync_age, "never");
        assert_eq!(report.records.len(), 2);
        assert_eq!(report.records[0].current, "2025-06-05");
        assert_eq!(report.records[0].builds[0].platform, "linux-x86_64");
        assert_eq!(report.records[0].builds[0].age, "unknown");
        assert!(report.records[0].builds[0].last_build.is_none());
        assert_eq!(report.records[0].builds[1].age, "3d");
        assert!(report.records[1].builds.is_empty());
    }
}
