//! Tracing setup with CROSSING_LOG and LOG_FORMAT support.

use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Filter directives for a `CROSSING_LOG` value.
fn directives(level: Option<&str>) -> String {
    let level = match level {
        Some("trace") => "trace",
        Some("debug") => "debug",
        Some("warn") | Some("warning") => "warn",
        Some("error") => "error",
        _ => "info",
    };
    format!("crossing={level},crossing_sim={level}")
}

/// Install the global subscriber. `RUST_LOG` wins over `CROSSING_LOG`.
pub fn init_tracing() {
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(directives(std::env::var("CROSSING_LOG").ok().as_deref()))
    };

    let use_json = std::env::var("LOG_FORMAT").as_deref() == Ok("json");

    if use_json {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    } else {
        let subscriber = tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(std::io::stderr));
        let _ = subscriber.try_init();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_defaults_to_info() {
        assert_eq!(directives(None), "crossing=info,crossing_sim=info");
        assert_eq!(directives(Some("chatty")), "crossing=info,crossing_sim=info");
    }

    #[test]
    fn level_aliases() {
        assert_eq!(directives(Some("warning")), "crossing=warn,crossing_sim=warn");
        assert_eq!(directives(Some("trace")), "crossing=trace,crossing_sim=trace");
    }
}
