use anyhow::Result;
use clap::Parser;
use netpilot::cli::commands::{Cli, Commands};
use netpilot::cli::handlers::{handle_analyze_command, handle_compare_command};
use netpilot::cli::utils::{init_logging, print_info};

#[tokio::main]
async fn main() -> Result<()> {
    // Pick up ARM_ACCESS_TOKEN and friends from a local .env if present
    let _ = dotenv::dotenv();

    let cli = Cli::parse();
    init_logging(cli.verbose, &cli.log_format);

    match cli.command {
        Commands::Analyze {
            workspace,
            resource_group,
            subscription,
            kind,
            offline,
            output,
            html,
            archive,
            config,
        } => {
            handle_analyze_command(
                workspace,
                resource_group,
                subscription,
                kind,
                offline,
                output,
                html,
                archive,
                config,
            )
            .await
        }

        Commands::Compare {
            workspace_a,
            resource_group_a,
            workspace_b,
            resource_group_b,
            subscription,
            kind,
            offline,
            output,
            config,
        } => {
            handle_compare_command(
                workspace_a,
                resource_group_a,
                workspace_b,
                resource_group_b,
                subscription,
                kind,
                offline,
                output,
                config,
            )
            .await
        }

        Commands::Info => {
            print_info();
            Ok(())
        }
    }
}
