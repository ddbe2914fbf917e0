//! System preamble construction.

use toolflow_config::AgentConfig;
use toolflow_core::tool::ToolManifest;

/// Build the system entry that opens every session.
///
/// Lists tools by name and description only, so the model learns what
/// exists without any implementation being loaded.
pub fn build_preamble(agent: &AgentConfig, tools: &[ToolManifest]) -> String {
    let mut out = match &agent.system_preamble {
        Some(custom) => custom.trim_end().to_string(),
        None => format!(
            "You are {}, a tool-using agent. Tool calls are planned and run by host code; \
             their outcomes appear below as one-line tool entries.",
            agent.name
        ),
    };

    if tools.is_empty() {
        out.push_str("\n\nNo tools are available.");
        return out;
    }

    out.push_str("\n\nAvailable tools:");
    for tool in tools {
        if tool.description.is_empty() {
            out.push_str(&format!("\n- {} ({})", tool.name, tool.category));
        } else {
            out.push_str(&format!(
                "\n- {} ({}): {}",
                tool.name, tool.category, tool.description
            ));
        }
    }
    out
}
