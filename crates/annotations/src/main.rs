//! CLI for fetching a panel's annotations from a live server
//!
//! Run with: cargo run --bin annotations-query -- [OPTIONS] <COMMAND>

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

use panel_annotations::{
    backend::{BackendClient, HttpBackend},
    config::Config,
    datasource::{BuiltInDatasource, StaticRegistry, BUILT_IN_DATASOURCE},
    metrics,
    models::{AnnotationQuery, Dashboard, PanelRef, RawTimeRange, TimeRange, NOW},
    AnnotationsService,
};

#[derive(Parser)]
#[command(author, version, about = "Fetch dashboard panel annotations", long_about = None)]
struct Cli {
    /// Log filter (overridden by RUST_LOG)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Aggregate and filter the annotations one panel would display
    Query {
        /// Dashboard JSON file (plain model or `{"dashboard": ...}` wrapper)
        #[arg(short, long)]
        dashboard: PathBuf,

        /// Requesting panel id
        #[arg(short, long)]
        panel: i64,

        /// Range start: `now`, `now-6h`, RFC 3339 or epoch milliseconds
        #[arg(long, default_value = "now-6h")]
        from: String,

        /// Range end, same formats as --from
        #[arg(long, default_value = "now")]
        to: String,

        /// Treat the panel as having an alert rule
        #[arg(long)]
        alert: bool,

        /// Pretty-print JSON output
        #[arg(long)]
        pretty: bool,
    },

    /// Print alert states for a saved dashboard
    States {
        /// Dashboard id
        #[arg(short, long)]
        dashboard_id: i64,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = Config::load()?;
    info!("Using annotations API at {}", config.api.base_url);
    metrics::register_metrics()?;

    let backend: Arc<dyn BackendClient> = Arc::new(HttpBackend::new(&config.api)?);

    match cli.command {
        Commands::Query {
            dashboard,
            panel,
            from,
            to,
            alert,
            pretty,
        } => {
            let raw = std::fs::read_to_string(&dashboard)
                .with_context(|| format!("Failed to read {}", dashboard.display()))?;
            let dashboard = parse_dashboard(&raw)?;
            let range = parse_range(&from, &to, Utc::now())?;

            let registry = StaticRegistry::new()
                .with_datasource(
                    BUILT_IN_DATASOURCE,
                    Arc::new(BuiltInDatasource::new(backend.clone(), config.query.limit)),
                )
                .with_default(BUILT_IN_DATASOURCE);
            let service = AnnotationsService::new(backend, Arc::new(registry));
            let mut failures = service.subscribe();

            let mut panel = PanelRef::new(panel);
            if alert {
                panel.alert = Some(serde_json::json!({}));
            }
            let query = AnnotationQuery {
                panel,
                dashboard: Arc::new(dashboard),
                range,
            };

            let result = service.get_annotations(&query).await;
            if let Ok(event) = failures.try_recv() {
                return Err(anyhow!("{:?}", event));
            }

            let output = if pretty {
                serde_json::to_string_pretty(&result)?
            } else {
                serde_json::to_string(&result)?
            };
            println!("{}", output);
        }
        Commands::States { dashboard_id } => {
            let states = backend.alert_states_for_dashboard(dashboard_id).await?;
            println!("{}", serde_json::to_string_pretty(&states)?);
        }
    }

    Ok(())
}

fn parse_dashboard(raw: &str) -> Result<Dashboard> {
    let value: serde_json::Value = serde_json::from_str(raw)?;
    let model = match value.get("dashboard") {
        Some(inner) if inner.is_object() => inner.clone(),
        _ => value,
    };
    Ok(serde_json::from_value(model)?)
}

fn parse_range(from: &str, to: &str, now: DateTime<Utc>) -> Result<TimeRange> {
    Ok(TimeRange {
        from: parse_time(from, now)?,
        to: parse_time(to, now)?,
        raw: RawTimeRange {
            from: from.to_string(),
            to: to.to_string(),
        },
    })
}

fn parse_time(input: &str, now: DateTime<Utc>) -> Result<DateTime<Utc>> {
    if input == NOW {
        return Ok(now);
    }
    if let Some(offset) = input.strip_prefix("now-") {
        return now
            .checked_sub_signed(parse_span(offset)?)
            .ok_or_else(|| anyhow!("Time out of range: {}", input));
    }
    if let Ok(millis) = input.parse::<i64>() {
        return DateTime::from_timestamp_millis(millis).ok_or_else(|| anyhow!("Timestamp out of range: {}", input));
    }
    Ok(DateTime::parse_from_rfc3339(input)
        .with_context(|| format!("Unrecognised time '{}'", input))?
        .with_timezone(&Utc))
}

fn parse_span(span: &str) -> Result<Duration> {
    let split = span
        .find(|c: char| !c.is_ascii_digit())
        .ok_or_else(|| anyhow!("Missing unit in '{}'", span))?;
    let (amount, unit) = span.split_at(split);
    let amount: i64 = amount.parse().with_context(|| format!("Invalid amount in '{}'", span))?;
    let duration = match unit {
        "s" => Duration::try_seconds(amount),
        "m" => Duration::try_minutes(amount),
        "h" => Duration::try_hours(amount),
        "d" => Duration::try_days(amount),
        "w" => Duration::try_weeks(amount),
        _ => return Err(anyhow!("Unknown unit '{}' in '{}'", unit, span)),
    };
    duration.ok_or_else(|| anyhow!("Span out of range: '{}'", span))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    #[test]
    fn test_relative_range_ends_at_now() {
        let range = parse_range("now-6h", "now", now()).unwrap();
        assert_eq!(range.from, now() - Duration::hours(6));
        assert_eq!(range.to, now());
        assert!(range.is_open_ended());
    }

    #[test]
    fn test_absolute_bounds() {
        assert_eq!(
            parse_time("2024-05-01T10:00:00Z", now()).unwrap(),
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 0, 0).unwrap()
        );
        assert_eq!(parse_time("1000", now()).unwrap().timestamp_millis(), 1000);
    }

    #[test]
    fn test_bad_spans() {
        assert!(parse_time("now-6", now()).is_err());
        assert!(parse_time("now-6y", now()).is_err());
        assert!(parse_time("yesterday", now()).is_err());
    }

    #[test]
    fn test_huge_spans_are_errors() {
        assert!(parse_time("now-9999999999999h", now()).is_err());
        assert!(parse_time("now-9999999999999w", now()).is_err());
        assert!(parse_time("now-250000000d", now()).is_err());
    }

    #[test]
    fn test_dashboard_wrapper_is_unwrapped() {
        let wrapped = r#"{"dashboard": {"id": 4, "uid": "ops"}, "meta": {}}"#;
        let dashboard = parse_dashboard(wrapped).unwrap();
        assert_eq!(dashboard.id, Some(4));

        let plain = r#"{"id": 5}"#;
        assert_eq!(parse_dashboard(plain).unwrap().id, Some(5));
    }
}
