//! Notification message rendering.
//!
//! All messages use the Telegram HTML parse mode, so user-provided values
//! are escaped before being embedded.

use std::fmt::{self, Display};

use store::{
    stats::{self, Statistics},
    ActivityBucket, Changes, HardwareClass, NodeRecord, OffsetDateTime,
};

/// Maximum count of nodes listed as needing attention.
const ATTENTION_LIMIT: usize = 5;

/// Maximum count of listed node changes.
const CHANGES_LIMIT: usize = 8;

/// Maximum count of nodes listed in a critical alert.
const CRITICAL_LIMIT: usize = 3;

/// Length after which the detailed report is cut off, in characters.
const DETAILED_REPORT_LIMIT: usize = 3000;

/// Activity histogram rows with their age ranges.
const ACTIVITY_ROWS: [(ActivityBucket, &str); 5] = [
    (ActivityBucket::VeryActive, " (&lt;10m)"),
    (ActivityBucket::Active, " (10-30m)"),
    (ActivityBucket::Warning, " (30-60m)"),
    (ActivityBucket::Problem, " (&gt;60m)"),
    (ActivityBucket::Unknown, ""),
];

/// Escape text for the HTML parse mode.
pub fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// `HH:MM:SS` representation of a UTC instant.
pub fn clock(now: OffsetDateTime) -> String {
    format!("{:02}:{:02}:{:02}", now.hour(), now.minute(), now.second())
}

/// `YYYY-MM-DD HH:MM:SS` representation of a UTC instant.
pub fn date_time(now: OffsetDateTime) -> String {
    format!(
        "{}-{:02}-{:02} {}",
        now.year(),
        u8::from(now.month()),
        now.day(),
        clock(now)
    )
}

/// Transaction age in the `Hh Mm` form, omitting hours if there are none.
pub fn format_age(minutes: u64) -> String {
    match (minutes / 60, minutes % 60) {
        (0, minutes) => format!("{minutes}m"),
        (hours, minutes) => format!("{hours}h {minutes}m"),
    }
}

fn hardware_icon(class: &HardwareClass) -> &'static str {
    match class {
        HardwareClass::Cpu => "🖥️",
        HardwareClass::Gpu => "🎮",
        _ => "❓",
    }
}

fn percent(ratio: f64) -> String {
    format!("{:.1}%", ratio * 100.0)
}

/// Message sent at the start of every monitoring cycle.
pub fn cycle_start(now: OffsetDateTime) -> String {
    format!(
        "🚀 <b>Monitoring cycle started</b>\n⏰ {} UTC",
        date_time(now)
    )
}

/// Main monitoring report.
pub struct MainReport<'a> {
    pub records: &'a [NodeRecord],
    pub changes: &'a Changes,
    pub now: OffsetDateTime,
}

impl Display for MainReport<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let stats = Statistics::from_records(self.records);

        writeln!(f, "🔍 <b>NODE MONITOR REPORT</b>")?;
        writeln!(f, "⏰ {} UTC", clock(self.now))?;
        writeln!(f)?;

        writeln!(f, "📊 <b>SUMMARY:</b>")?;
        writeln!(f, "• Total nodes: <b>{}</b>", stats.total)?;
        writeln!(
            f,
            "• Online: <b>{}</b> ({})",
            stats.online,
            percent(stats.online_ratio())
        )?;
        writeln!(
            f,
            "• With addresses: <b>{}</b> ({})",
            stats.with_address,
            percent(stats.address_ratio())
        )?;
        writeln!(f, "• Total wins: <b>{}</b>", stats.total_wins)?;
        writeln!(f)?;

        if !stats.hardware.is_empty() {
            writeln!(f, "🖥️ <b>BY HARDWARE:</b>")?;

            for (class, hardware) in &stats.hardware {
                writeln!(
                    f,
                    "{} {}: <b>{}/{}</b> ({}) | Wins: <b>{}</b>",
                    hardware_icon(class),
                    escape(class.as_str()),
                    hardware.online,
                    hardware.total,
                    percent(hardware.online_ratio()),
                    hardware.wins
                )?;
            }

            writeln!(f)?;
        }

        writeln!(f, "🚦 <b>TRANSACTION ACTIVITY:</b>")?;

        for (bucket, range) in ACTIVITY_ROWS {
            writeln!(
                f,
                "{} {}{}: <b>{}</b>",
                bucket.marker(),
                bucket.label(),
                range,
                stats.activity.count(bucket)
            )?;
        }

        let attention: Vec<_> = stats::needing_attention(self.records).collect();

        if !attention.is_empty() {
            writeln!(f)?;
            writeln!(f, "⚠️ <b>NEED ATTENTION:</b>")?;

            for record in attention.iter().take(ATTENTION_LIMIT) {
                writeln!(
                    f,
                    "• {} {} {} - {}m",
                    ActivityBucket::from_age(record.last_tx_age_minutes).marker(),
                    hardware_icon(&record.hardware_class),
                    escape(&record.custom_name),
                    record.last_tx_age_minutes.unwrap_or_default()
                )?;
            }

            if attention.len() > ATTENTION_LIMIT {
                writeln!(
                    f,
                    "• ... and {} more nodes",
                    attention.len() - ATTENTION_LIMIT
                )?;
            }
        }

        writeln!(f)?;

        if self.changes.is_empty() {
            return writeln!(f, "📊 <b>First monitoring run</b>");
        }

        writeln!(f, "📈 <b>CHANGES:</b>")?;

        let changed: Vec<_> = self
            .records
            .iter()
            .filter_map(|record| {
                let change = self.changes.get(&record.id)?;
                change.is_significant().then_some((record, change))
            })
            .collect();

        if changed.is_empty() {
            return writeln!(f, "• No significant changes");
        }

        for (record, change) in changed.iter().take(CHANGES_LIMIT) {
            let mut parts = Vec::new();

            if change.win_delta != 0 {
                let icon = if change.win_delta > 0 { "🏆" } else { "📉" };
                parts.push(format!("Wins {icon}{:+}", change.win_delta));
            }

            if change.reward_delta != 0 {
                let icon = if change.reward_delta > 0 { "💰" } else { "📉" };
                parts.push(format!("Rewards {icon}{:+}", change.reward_delta));
            }

            if change.online_flag_changed {
                let icon = if record.online { "🟢" } else { "🔴" };
                parts.push(format!("Status {icon}"));
            }

            writeln!(
                f,
                "• {} <code>{}</code>: {}",
                hardware_icon(&record.hardware_class),
                escape(&record.custom_name),
                parts.join(", ")
            )?;
        }

        if changed.len() > CHANGES_LIMIT {
            writeln!(f, "• ... and {} more changes", changed.len() - CHANGES_LIMIT)?;
        }

        Ok(())
    }
}

/// Alert about nodes without transactions for at least an hour.
pub struct CriticalAlert<'a> {
    nodes: Vec<&'a NodeRecord>,
}

impl<'a> CriticalAlert<'a> {
    /// Create an alert if any of the records is critical.
    pub fn new(records: &'a [NodeRecord]) -> Option<Self> {
        let nodes: Vec<_> = stats::critical(records).collect();
        (!nodes.is_empty()).then_some(Self { nodes })
    }
}

impl Display for CriticalAlert<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "🚨 <b>CRITICAL ALERT!</b>")?;
        writeln!(f)?;
        writeln!(
            f,
            "<b>{}</b> nodes without transactions for more than an hour!",
            self.nodes.len()
        )?;
        writeln!(f)?;

        for record in self.nodes.iter().take(CRITICAL_LIMIT) {
            writeln!(
                f,
                "🔴 {} <code>{}</code> - {}",
                hardware_icon(&record.hardware_class),
                escape(&record.custom_name),
                format_age(record.last_tx_age_minutes.unwrap_or_default())
            )?;
        }

        if self.nodes.len() > CRITICAL_LIMIT {
            writeln!(f, "... and {} more nodes", self.nodes.len() - CRITICAL_LIMIT)?;
        }

        writeln!(f)?;
        write!(f, "⚡ Immediate check required!")
    }
}

/// Per-node report, cut off once it grows past a fixed length.
pub fn detailed_report(records: &[NodeRecord]) -> String {
    let mut message = String::from("📋 <b>DETAILED NODE REPORT:</b>\n\n");

    for (index, record) in records.iter().enumerate() {
        let bucket = ActivityBucket::from_age(record.last_tx_age_minutes);

        let last_tx = match record.last_tx_age_minutes {
            None => String::from("No data"),
            Some(minutes) => format!("{} ago", format_age(minutes)),
        };

        let online = if record.online {
            "🟢 Online"
        } else {
            "🔴 Offline"
        };

        let address = record
            .address
            .map_or_else(|| String::from("No address"), |address| address.to_string());

        message.push_str(&format!(
            "<b>Name:</b> {} {}\n\
             <b>ID:</b> <code>{}</code>\n\
             <b>API name:</b> {}\n\
             <b>Type:</b> {}\n\
             <b>Address:</b> <code>{}</code>\n\
             <b>Status:</b> {}\n\
             <b>Wins:</b> {}\n\
             <b>Rewards:</b> {}\n\
             <b>Activity:</b> {} {}\n\
             <b>Last TX:</b> {}\n\
             {}\n\n",
            hardware_icon(&record.hardware_class),
            escape(&record.custom_name),
            escape(&record.id),
            escape(&record.api_name),
            escape(record.hardware_class.as_str()),
            address,
            online,
            record.win_count,
            record.reward_score,
            bucket.marker(),
            bucket.label(),
            last_tx,
            "=".repeat(30),
        ));

        if message.chars().count() > DETAILED_REPORT_LIMIT {
            let remaining = records.len() - index - 1;

            if remaining > 0 {
                message.push_str(&format!("... and {remaining} more nodes\n"));
            }

            break;
        }
    }

    message
}

/// Caption of the spreadsheet export document.
pub fn document_caption(now: OffsetDateTime) -> String {
    format!("📊 Detailed monitoring report\n⏰ {} UTC", date_time(now))
}

/// Notification about a roster that couldn't be loaded.
pub fn roster_error(path: &str, err: &dyn Display) -> String {
    format!(
        "❌ <b>ERROR:</b> Unable to read node roster from {}\n<code>{}</code>",
        escape(path),
        escape(&err.to_string())
    )
}

/// Notification about a failed batch address resolution.
pub fn resolution_error(err: &dyn Display) -> String {
    format!(
        "❌ <b>CRITICAL MONITORING ERROR:</b> Address resolution failed, \
         all nodes are treated as unresolved\n<code>{}</code>",
        escape(&err.to_string())
    )
}

/// Message sent when continuous monitoring starts.
pub fn startup(interval_minutes: u64, telegram: bool, now: OffsetDateTime) -> String {
    format!(
        "🤖 <b>NODE MONITOR STARTED</b>\n\n\
         📅 {} UTC\n\
         ⏰ Interval: every {interval_minutes} minutes\n\
         📱 Telegram notifications: {}\n\
         🔄 Mode: continuous monitoring\n\n\
         ℹ️ Next report in {interval_minutes} minutes",
        date_time(now),
        if telegram { "ON" } else { "OFF" },
    )
}

/// Connection test message.
pub fn test_connection() -> String {
    String::from("🧪 <b>CONNECTION TEST</b>\n✅ Node monitor is ready!")
}

/// Message sent when continuous monitoring is stopped.
pub fn shutdown(now: OffsetDateTime) -> String {
    format!(
        "🛑 <b>MONITORING STOPPED</b>\n📅 {} UTC\n👤 Stopped by user",
        date_time(now)
    )
}
