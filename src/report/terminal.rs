use crate::compare::{ComparisonResult, Significance};
use crate::model::{AnalysisResult, Priority, StepStatus};
use colored::Colorize;

const TERMINAL_WIDTH: usize = 80;
const SEPARATOR_WIDTH: usize = 40;

/// Console summary printer for analysis and comparison results.
pub struct TerminalReporter {
    verbose: bool,
}

impl Default for TerminalReporter {
    fn default() -> Self {
        Self::new()
    }
}

impl TerminalReporter {
    pub fn new() -> Self {
        Self { verbose: false }
    }

    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    pub fn print_result(&self, result: &AnalysisResult) {
        self.print_header("CONNECTIVITY ANALYSIS SUMMARY");
        self.print_workspace(result);
        self.print_network(result);
        self.print_resources(result);
        self.print_recommendations(result);
        self.print_steps(result);
        self.print_footer();
    }

    fn print_header(&self, title: &str) {
        println!("\n{}", "═".repeat(TERMINAL_WIDTH).bright_blue());
        println!("{}", title.bright_white().bold());
        println!("{}", "═".repeat(TERMINAL_WIDTH).bright_blue());
    }

    fn print_workspace(&self, result: &AnalysisResult) {
        println!("\n{}", "📍 Workspace".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());
        println!("  Name:            {}", result.session.workspace_name.bright_cyan());
        println!("  Resource Group:  {}", result.session.resource_group.bright_cyan());
        println!("  Kind:            {}", result.session.kind);
        if let Some(subscription) = &result.session.subscription_id {
            println!("  Subscription:    {}", subscription);
        }
        let status = if result.success {
            "completed".bright_green()
        } else {
            "degraded".bright_red()
        };
        println!("  Run status:      {}", status);
    }

    fn print_network(&self, result: &AnalysisResult) {
        println!("\n{}", "🌐 Network Configuration".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());

        let Some(network) = &result.network_configuration else {
            println!("  {}", "not captured for this run".bright_black());
            return;
        };
        println!("  Topology:        {}", network.topology.to_string().bright_cyan());
        println!("  Isolation:       {}", network.isolation_mode);
        let access = if network.public_network_access {
            "⚠️  enabled".bright_yellow()
        } else {
            "✅ disabled".bright_green()
        };
        println!("  Public access:   {}", access);
        println!("  Private endpoints: {}", network.private_endpoints.len());
        println!("  Outbound rules:    {}", network.outbound_rules.len());
    }

    fn print_resources(&self, result: &AnalysisResult) {
        println!("\n{}", "🔗 Connected Resources".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());

        if result.connected_resources.is_empty() {
            println!("  {}", "no resources analyzed".bright_black());
        }
        for resource in &result.connected_resources {
            let score = format_score(resource.security_score);
            println!(
                "  {} {} ({}, {})",
                score,
                resource.name.bright_cyan(),
                resource.kind,
                resource.access_method
            );
            if self.verbose {
                for issue in &resource.issues {
                    let label = serde_json::to_string(issue)
                        .unwrap_or_default()
                        .replace('"', "");
                    println!("      • {}", label.bright_black());
                }
            }
        }

        if let Some(summary) = &result.security_summary {
            println!();
            println!(
                "  Average score:   {}",
                format_score_f64(summary.average_security_score)
            );
            println!(
                "  Public access:   {}/{}",
                summary.public_accessible, summary.total_resources
            );
            println!(
                "  Behind private endpoints: {}/{}",
                summary.private_endpoint_protected, summary.total_resources
            );
        }
    }

    fn print_recommendations(&self, result: &AnalysisResult) {
        let Some(summary) = &result.security_summary else {
            return;
        };
        if summary.recommendations.is_empty() {
            return;
        }

        println!("\n{}", "⚡ Recommendations".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());
        for recommendation in &summary.recommendations {
            let priority = match recommendation.priority {
                Priority::High => "HIGH".bright_red().bold(),
                Priority::Medium => "MEDIUM".bright_yellow(),
                Priority::Low => "LOW".bright_green(),
            };
            println!("  [{}] {}", priority, recommendation.text);
        }
    }

    fn print_steps(&self, result: &AnalysisResult) {
        println!("\n{}", "📋 Steps".bright_white().bold());
        println!("{}", "─".repeat(SEPARATOR_WIDTH).bright_black());
        for outcome in &result.step_outcomes {
            let status = match outcome.status {
                StepStatus::Succeeded => "✅".to_string(),
                StepStatus::Failed => "❌".to_string(),
                StepStatus::Skipped => "⏭️ ".to_string(),
                StepStatus::Running => "…".to_string(),
                StepStatus::Pending => "·".to_string(),
            };
            let duration = outcome
                .duration_ms
                .map(|ms| format!(" ({}ms)", ms))
                .unwrap_or_default();
            println!("  {} {}{}", status, outcome.step.name(), duration);
            if let Some(error) = &outcome.error {
                println!("      {}", error.bright_red());
            }
            for item in &outcome.item_errors {
                println!("      • {}", item.bright_yellow());
            }
        }
    }

    fn print_footer(&self) {
        println!("\n{}\n", "═".repeat(TERMINAL_WIDTH).bright_blue());
    }

    pub fn print_comparison(&self, comparison: &ComparisonResult) {
        self.print_header("WORKSPACE COMPARISON");
        println!(
            "\n  A: {}    B: {}",
            comparison.left.session.workspace_name.bright_magenta(),
            comparison.right.session.workspace_name.bright_green()
        );
        println!(
            "  {} difference(s): {} material, {} cosmetic",
            comparison.differences.len(),
            comparison.material_count().to_string().bright_red(),
            comparison.cosmetic_count().to_string().bright_yellow()
        );

        if comparison.differences.is_empty() {
            println!(
                "\n  {}",
                "✅ No differences; connectivity configurations match.".bright_green()
            );
        } else {
            println!();
            for diff in &comparison.differences {
                let significance = match diff.significance {
                    Significance::Material => "material".bright_red(),
                    Significance::Cosmetic => "cosmetic".bright_black(),
                };
                println!("  {} [{}]", diff.path.bright_cyan(), significance);
                println!("      A: {}", diff.value_a);
                println!("      B: {}", diff.value_b);
            }
        }
        self.print_footer();
    }
}

fn format_score(score: u8) -> colored::ColoredString {
    let text = format!("{:>3}", score);
    if score >= 80 {
        text.bright_green()
    } else if score >= 60 {
        text.bright_yellow()
    } else {
        text.bright_red()
    }
}

fn format_score_f64(score: f64) -> colored::ColoredString {
    let text = format!("{:.1}/100", score);
    if score >= 80.0 {
        text.bright_green()
    } else if score >= 60.0 {
        text.bright_yellow()
    } else {
        text.bright_red()
    }
}
