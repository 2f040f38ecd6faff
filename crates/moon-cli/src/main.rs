//! Moon CLI binary entrypoint.

use std::io;
use std::process::ExitCode;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use moon_cli::cli::{Cli, Commands};
use moon_cli::commands::{
    load_config, CheckCommand, ListCommand, OptionsCommand, ValidateCommand,
};
use moon_cli::output::OutputFormat;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let cli = Cli::parse();

    let runtime = match tokio::runtime::Runtime::new() {
        Ok(rt) => rt,
        Err(e) => {
            eprintln!("Failed to create async runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    match runtime.block_on(run(cli)) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), moon_cli::CliError> {
    let format = OutputFormat::new(cli.format);
    let config = load_config(cli.config.as_deref())?;
    let mut stdout = io::stdout().lock();

    match cli.command {
        Commands::Check(args) => {
            CheckCommand::new().execute(&mut stdout, &format, &args)?;
        }
        Commands::Validate { schema, record } => {
            ValidateCommand::new().execute(&mut stdout, &format, &schema, &record)?;
        }
        Commands::Options {
            schema,
            field,
            keyword,
        } => {
            let cmd = OptionsCommand::new(config);
            cmd.execute(&mut stdout, &format, &schema, &field, &keyword)
                .await?;
        }
        Commands::List(args) => {
            let cmd = ListCommand::new(config);
            cmd.execute(&mut stdout, &format, &args).await?;
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use moon_cli::cli::Format;

    #[test]
    fn cli_parses_check() {
        let cli = Cli::parse_from(["moon", "check", "schema.json", "-o", "groups.json"]);
        match cli.command {
            Commands::Check(args) => {
                assert_eq!(args.schema.to_str(), Some("schema.json"));
                assert_eq!(args.options.as_deref().and_then(|p| p.to_str()), Some("groups.json"));
            }
            _ => panic!("expected check command"),
        }
    }

    #[test]
    fn cli_parses_options_with_default_keyword() {
        let cli = Cli::parse_from(["moon", "options", "schema.json", "groupId"]);
        match cli.command {
            Commands::Options { field, keyword, .. } => {
                assert_eq!(field, "groupId");
                assert!(keyword.is_empty());
            }
            _ => panic!("expected options command"),
        }
    }

    #[test]
    fn cli_parses_list_filters() {
        let cli = Cli::parse_from([
            "moon", "list", "alarms.json", "--page", "2", "--filter", "status=1", "--filter",
            "keyword=cpu",
        ]);
        match cli.command {
            Commands::List(args) => {
                assert_eq!(args.page, 2);
                assert_eq!(args.size, None);
                assert_eq!(args.filters, vec!["status=1", "keyword=cpu"]);
            }
            _ => panic!("expected list command"),
        }
    }

    #[test]
    fn cli_respects_format_flag() {
        let cli = Cli::parse_from(["moon", "--format", "json", "check", "schema.json"]);
        assert_eq!(cli.format, Format::Json);
    }

    #[tokio::test]
    async fn run_check_missing_schema_fails() {
        let cli = Cli::parse_from(["moon", "check", "/nonexistent/moon/schema.json"]);
        let result = run(cli).await;
        assert!(matches!(result, Err(moon_cli::CliError::Read { .. })));
    }
}
