use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct CliArgs {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub config_path: PathBuf,
    pub static_dir: PathBuf,
}

enum ParseOutcome {
    Args(CliArgs),
    Help,
}

fn default_static_dir() -> PathBuf {
    PathBuf::from("web/dist")
}

fn usage() {
    eprintln!(
        "usage:
  callboard-monitor [--host <host>] [--port <port>] [--config <path>] [--static-dir <path>]
"
    );
}

fn parse_args_impl(mut args: impl Iterator<Item = String>) -> Result<ParseOutcome, String> {
    let mut host = None;
    let mut port = None;
    let mut config_path: Option<PathBuf> = None;
    let mut static_dir: Option<PathBuf> = None;

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--host" => {
                host = Some(
                    args.next()
                        .ok_or_else(|| "--host requires a value".to_string())?,
                );
            }
            "--port" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--port requires a value".to_string())?;
                port = Some(
                    value
                        .parse::<u16>()
                        .map_err(|_| format!("invalid --port value: {value}"))?,
                );
            }
            "--config" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--config requires a value".to_string())?;
                config_path = Some(PathBuf::from(value));
            }
            "--static-dir" => {
                let value = args
                    .next()
                    .ok_or_else(|| "--static-dir requires a value".to_string())?;
                static_dir = Some(PathBuf::from(callboard_config::expand_path(&value)));
            }
            "-h" | "--help" | "help" => {
                return Ok(ParseOutcome::Help);
            }
            _ => {}
        }
    }

    Ok(ParseOutcome::Args(CliArgs {
        host,
        port,
        config_path: callboard_config::resolve_monitor_config_path(config_path),
        static_dir: static_dir.unwrap_or_else(default_static_dir),
    }))
}

pub fn parse_args() -> CliArgs {
    match parse_args_impl(std::env::args().skip(1)) {
        Ok(ParseOutcome::Args(args)) => args,
        Ok(ParseOutcome::Help) => {
            usage();
            std::process::exit(0);
        }
        Err(error) => {
            eprintln!("error: {error}");
            usage();
            std::process::exit(2);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{parse_args_impl, ParseOutcome};
    use std::path::PathBuf;

    fn args(values: &[&str]) -> impl Iterator<Item = String> {
        values
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>()
            .into_iter()
    }

    #[test]
    fn parse_args_rejects_config_without_value() {
        let result = parse_args_impl(args(&["--config"]));
        assert!(matches!(
            result,
            Err(error) if error == "--config requires a value"
        ));
    }

    #[test]
    fn parse_args_rejects_non_numeric_port() {
        let result = parse_args_impl(args(&["--port", "eighty"]));
        assert!(matches!(
            result,
            Err(error) if error == "invalid --port value: eighty"
        ));
    }

    #[test]
    fn parse_args_accepts_overrides() {
        let result = parse_args_impl(args(&[
            "--host",
            "0.0.0.0",
            "--port",
            "9090",
            "--config",
            "custom.toml",
            "--static-dir",
            "/srv/ui",
        ]));

        let ParseOutcome::Args(parsed) = result.expect("parse success") else {
            panic!("expected parsed args");
        };

        assert_eq!(parsed.host.as_deref(), Some("0.0.0.0"));
        assert_eq!(parsed.port, Some(9090));
        assert_eq!(parsed.config_path, PathBuf::from("custom.toml"));
        assert_eq!(parsed.static_dir, PathBuf::from("/srv/ui"));
    }

    #[test]
    fn parse_args_reports_help() {
        let result = parse_args_impl(args(&["--help"]));
        assert!(matches!(result, Ok(ParseOutcome::Help)));
    }
}
