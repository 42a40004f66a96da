use super::ReportResult;
use crate::compare::ComparisonResult;
use crate::model::{AccessMethod, AnalysisResult, StepStatus};
use chrono::Utc;
use serde_json::json;
use tera::{Context, Tera};

const REPORT_TEMPLATE: &str = r#"# {{ kind }} Connectivity Analysis Report

## Executive Summary

**Workspace:** {{ workspace }}
**Resource Group:** {{ resource_group }}
**Kind:** {{ kind }}
**Run:** {{ run_id }}
**Started:** {{ started_at }}
**Result:** {{ overall }}

{{ badges }}

## Network Configuration

{% if network %}| Setting | Value |
|---------|-------|
| Topology | {{ network.topology }} |
| Isolation mode | {{ network.isolation_mode }} |
| Public network access | {{ network.public_network_access }} |
| Private endpoints | {{ network.private_endpoint_count }} |
| Outbound rules | {{ network.outbound_rule_count }} |
{% if network.outbound_rules | length > 0 %}
### Outbound Rules

| Name | Type | Destination |
|------|------|-------------|
{% for rule in network.outbound_rules %}| {{ rule.name }} | {{ rule.rule_type }} | {{ rule.destination }} |
{% endfor %}{% endif %}{% else %}Network configuration was not captured for this run.
{% endif %}
## Connected Resources

{% if resources | length > 0 %}| Kind | Count | Avg Score |
|------|-------|-----------|
{% for row in kind_rows %}| {{ row.kind }} | {{ row.count }} | {{ row.average }}/100 |
{% endfor %}
| Name | Kind | Access Method | Score | Issues |
|------|------|---------------|-------|--------|
{% for r in resources %}| {{ r.name }} | {{ r.kind }} | {{ r.access_method }} | {{ r.score }}/100 | {{ r.issues }} |
{% endfor %}{% else %}No connected resources were analyzed.
{% endif %}
## Connectivity Diagram

```mermaid
{{ diagram }}
```

## Security Summary

{% if summary %}- **Average security score:** {{ summary.average }}/100
- **Resources with public access:** {{ summary.public_accessible }}/{{ summary.total }}
- **Resources behind private endpoints:** {{ summary.private_endpoint_protected }}/{{ summary.total }}
{% else %}No security summary was produced for this run.
{% endif %}
## Recommendations

{% if recommendations | length > 0 %}{% for rec in recommendations %}{{ loop.index }}. **{{ rec.priority }}** — {{ rec.text }}
{% endfor %}{% else %}No recommendations at this time.
{% endif %}
## Issues Encountered

{% if issues | length > 0 %}{% for issue in issues %}- {{ issue }}
{% endfor %}{% else %}None. All steps completed without errors.
{% endif %}
## Step Outcomes

| Step | Status | Duration |
|------|--------|----------|
{% for step in steps %}| {{ step.name }} | {{ step.status }} | {{ step.duration }} |
{% endfor %}
---

*Generated at {{ generated_at }} · content digest `{{ digest }}`*
"#;

const COMPARISON_TEMPLATE: &str = r#"# Workspace Connectivity Comparison

**Workspace A:** {{ workspace_a }} ({{ result_a }})
**Workspace B:** {{ workspace_b }} ({{ result_b }})

**Differences:** {{ total }} total — {{ material }} material, {{ cosmetic }} cosmetic

{% if diffs | length > 0 %}| Field | {{ workspace_a }} | {{ workspace_b }} | Significance |
|-------|-----|-----|--------------|
{% for d in diffs %}| `{{ d.path }}` | {{ d.value_a }} | {{ d.value_b }} | {{ d.significance }} |
{% endfor %}{% else %}No differences found; the workspaces have matching connectivity configurations.
{% endif %}
---

*Generated at {{ generated_at }}*
"#;

/// Render the diagram-annotated Markdown report.
pub fn render(result: &AnalysisResult) -> ReportResult<String> {
    let overall = if result.success {
        "✅ completed successfully".to_string()
    } else if let Some(first_failed) = result
        .step_outcomes
        .iter()
        .find(|o| o.status == StepStatus::Failed)
    {
        format!("❌ failed at {}", first_failed.step.name())
    } else {
        "⚠️ aborted".to_string()
    };

    let network = result.network_configuration.as_ref().map(|n| {
        json!({
            "topology": n.topology.to_string(),
            "isolation_mode": n.isolation_mode.to_string(),
            "public_network_access": if n.public_network_access { "Enabled" } else { "Disabled" },
            "private_endpoint_count": n.private_endpoints.len(),
            "outbound_rule_count": n.outbound_rules.len(),
            "outbound_rules": n.outbound_rules.iter().map(|r| json!({
                "name": r.name,
                "rule_type": r.rule_type.to_string(),
                "destination": r.destination,
            })).collect::<Vec<_>>(),
        })
    });

    let mut kind_rows = Vec::new();
    if let Some(summary) = &result.security_summary {
        for (kind, count) in &summary.resources_by_kind {
            let scores: Vec<u32> = result
                .connected_resources
                .iter()
                .filter(|r| r.kind.label() == kind)
                .map(|r| u32::from(r.security_score))
                .collect();
            let average = if scores.is_empty() {
                0.0
            } else {
                scores.iter().sum::<u32>() as f64 / scores.len() as f64
            };
            kind_rows.push(json!({
                "kind": kind,
                "count": count,
                "average": format!("{:.1}", average),
            }));
        }
    }

    let resources: Vec<_> = result
        .connected_resources
        .iter()
        .map(|r| {
            let issues = if r.issues.is_empty() {
                "—".to_string()
            } else {
                r.issues
                    .iter()
                    .map(|i| serde_json::to_string(i).unwrap_or_default().replace('"', ""))
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            json!({
                "name": r.name,
                "kind": r.kind.to_string(),
                "access_method": r.access_method.to_string(),
                "score": r.security_score,
                "issues": issues,
            })
        })
        .collect();

    let mut issues = Vec::new();
    for outcome in &result.step_outcomes {
        match outcome.status {
            StepStatus::Failed => issues.push(format!(
                "step `{}` failed: {}",
                outcome.step.name(),
                outcome.error.as_deref().unwrap_or("unknown error")
            )),
            StepStatus::Skipped => {
                issues.push(format!("step `{}` was skipped", outcome.step.name()))
            }
            _ => {}
        }
        for item in &outcome.item_errors {
            issues.push(format!("{}: {}", outcome.step.name(), item));
        }
    }

    let steps: Vec<_> = result
        .step_outcomes
        .iter()
        .map(|o| {
            json!({
                "name": o.step.name(),
                "status": status_label(o.status),
                "duration": o.duration_ms.map(format_duration).unwrap_or_else(|| "—".to_string()),
            })
        })
        .collect();

    let context_value = json!({
        "workspace": result.session.workspace_name,
        "resource_group": result.session.resource_group,
        "kind": result.session.kind.to_string(),
        "run_id": result.session.run_id,
        "started_at": result.session.started_at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        "generated_at": Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
        "overall": overall,
        "badges": badges(result),
        "network": network,
        "kind_rows": kind_rows,
        "resources": resources,
        "summary": result.security_summary.as_ref().map(|s| json!({
            "average": format!("{:.1}", s.average_security_score),
            "total": s.total_resources,
            "public_accessible": s.public_accessible,
            "private_endpoint_protected": s.private_endpoint_protected,
        })),
        "recommendations": result.security_summary.as_ref()
            .map(|s| s.recommendations.iter().map(|r| json!({
                "priority": r.priority.to_string(),
                "text": r.text,
            })).collect::<Vec<_>>())
            .unwrap_or_default(),
        "issues": issues,
        "steps": steps,
        "diagram": build_diagram(result),
        "digest": result.content_digest(),
    });

    let context = Context::from_serialize(context_value)?;
    let rendered = Tera::one_off(REPORT_TEMPLATE, &context, false)?;
    Ok(rendered)
}

/// Render the comparison report.
pub fn render_comparison(comparison: &ComparisonResult) -> ReportResult<String> {
    let run_label = |result: &AnalysisResult| {
        if result.success {
            "completed"
        } else {
            "degraded"
        }
    };
    let context_value = json!({
        "workspace_a": comparison.left.session.workspace_name,
        "workspace_b": comparison.right.session.workspace_name,
        "result_a": run_label(&comparison.left),
        "result_b": run_label(&comparison.right),
        "total": comparison.differences.len(),
        "material": comparison.material_count(),
        "cosmetic": comparison.cosmetic_count(),
        "diffs": comparison.differences.iter().map(|d| json!({
            "path": d.path,
            "value_a": d.value_a,
            "value_b": d.value_b,
            "significance": d.significance.to_string(),
        })).collect::<Vec<_>>(),
        "generated_at": Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    });

    let context = Context::from_serialize(context_value)?;
    Ok(Tera::one_off(COMPARISON_TEMPLATE, &context, false)?)
}

fn badges(result: &AnalysisResult) -> String {
    let mut badges = Vec::new();
    if let Some(network) = &result.network_configuration {
        if network.public_network_access {
            badges.push("⚠️ **Public Access Enabled**".to_string());
        } else {
            badges.push("🛡️ **Private Network**".to_string());
        }
        if !network.private_endpoints.is_empty() {
            badges.push(format!(
                "🔒 **{} Private Endpoint(s)**",
                network.private_endpoints.len()
            ));
        }
    }
    if let Some(summary) = &result.security_summary {
        let badge = if summary.average_security_score >= 80.0 {
            "✅ **High Security**"
        } else if summary.average_security_score >= 60.0 {
            "⚠️ **Medium Security**"
        } else {
            "❌ **Low Security**"
        };
        badges.push(badge.to_string());
    }
    badges.join(" | ")
}

/// Node-and-edge connectivity diagram: workspace → network boundary →
/// resources, annotated with each resource's access method.
fn build_diagram(result: &AnalysisResult) -> String {
    let mut diagram = String::from("graph TB\n");
    diagram.push_str(&format!(
        "    subgraph \"Resource Group {}\"\n",
        result.session.resource_group
    ));
    diagram.push_str(&format!(
        "        WS[\"{}<br/>({})\"]\n",
        result.session.workspace_name, result.session.kind
    ));

    let boundary = match &result.network_configuration {
        Some(network) => {
            let label = match network.topology {
                crate::model::NetworkTopology::Managed => format!(
                    "Managed VNet<br/>isolation: {}",
                    network.isolation_mode
                ),
                crate::model::NetworkTopology::Customer => {
                    "Customer VNet<br/>(customer-managed)".to_string()
                }
            };
            diagram.push_str(&format!("        NET[\"{}\"]\n", label));
            diagram.push_str("        WS --> NET\n");
            "NET"
        }
        None => "WS",
    };

    for (index, resource) in result.connected_resources.iter().enumerate() {
        let annotation = match resource.access_method {
            AccessMethod::PrivateEndpoint => "🔒 private-endpoint",
            AccessMethod::Public => "⚠️ public",
            AccessMethod::VnetIntegrated => "🔗 vnet-integrated",
            AccessMethod::Unknown => "❓ unknown",
        };
        diagram.push_str(&format!(
            "        R{index}[\"{}<br/>({})<br/>{}\"]\n",
            resource.name, resource.kind, annotation
        ));
        diagram.push_str(&format!("        {boundary} --> R{index}\n"));
    }

    diagram.push_str("    end");
    diagram
}

fn status_label(status: StepStatus) -> &'static str {
    match status {
        StepStatus::Pending => "pending",
        StepStatus::Running => "running",
        StepStatus::Succeeded => "✅ succeeded",
        StepStatus::Failed => "❌ failed",
        StepStatus::Skipped => "⏭️ skipped",
    }
}

fn format_duration(ms: u64) -> String {
    if ms >= 1000 {
        format!("{:.1}s", ms as f64 / 1000.0)
    } else {
        format!("{}ms", ms)
    }
}
