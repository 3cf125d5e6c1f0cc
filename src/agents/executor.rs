//! Executor agent — tool-backed; runs the solver's snippet through the
//! subprocess executor and folds the run report into the solution.
//!
//! Its upstream handler converts upstream failures into an explanatory
//! report so the conversation still reaches the user.

use std::sync::Arc;

use super::{agent_name, AgentStack, ExecutionReport, Solution};
use crate::agent::{
    json_decoder, json_encoder, AgentBuilder, AgentDefinition, UpstreamNotice, UpstreamReaction,
};
use crate::pipeline::process::{self, MaxReflections};
use crate::tools::SubprocessRequest;
use crate::types::{Error, Result};

pub const NAME: &str = "executor";

/// Strip markdown code fences the model may have wrapped around a snippet.
fn strip_fences(code: &str) -> String {
    let trimmed = code.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed.to_string();
    };
    // drop the language tag on the opening fence line
    let body = rest.split_once('\n').map(|(_, body)| body).unwrap_or(rest);
    body.strip_suffix("```").unwrap_or(body).trim().to_string()
}

pub async fn definition(stack: &AgentStack) -> Result<AgentDefinition<Solution, ExecutionReport>> {
    let sanitize = process::pure("sanitize_code", |solution: Solution| Solution {
        code: strip_fences(&solution.code),
        ..solution
    });

    let timeout_seconds = stack.code_timeout_seconds;
    let run = process::tool(
        "run_code",
        MaxReflections::NONE,
        Arc::clone(&stack.code_runner),
        move |solution: &Solution| {
            Ok(serde_json::to_value(SubprocessRequest {
                code: solution.code.clone(),
                timeout_seconds,
            })?)
        },
        |solution: &Solution, output| {
            let stdout = output
                .get("stdout")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let stderr = output
                .get("stderr")
                .and_then(|v| v.as_str())
                .unwrap_or_default()
                .to_string();
            let exit_code = output
                .get("exit_code")
                .and_then(|v| v.as_i64())
                .ok_or_else(|| Error::tool("run report missing exit_code"))?;
            Ok(ExecutionReport {
                explanation: solution.explanation.clone(),
                code: solution.code.clone(),
                stdout,
                stderr,
                exit_code,
                ran: exit_code == 0,
            })
        },
    );

    let upstream = Arc::new(|notice: UpstreamNotice| match notice {
        UpstreamNotice::Failure(failure) => UpstreamReaction::Continue(Solution {
            brief: String::new(),
            explanation: format!(
                "Upstream agent {} failed ({}); nothing to execute.",
                failure.from_agent, failure.error
            ),
            code: String::new(),
        }),
        UpstreamNotice::Rejection(rejection) => UpstreamReaction::Reject {
            policy: rejection.guardrail_name,
            reason: rejection.reason,
        },
    });

    Ok(AgentBuilder::new(agent_name(NAME)?)
        .input(json_decoder())
        .on_upstream(upstream)
        .pipeline(sanitize.then(run))
        .output_to(agent_name(super::presenter::NAME)?, json_encoder())
        .build())
}
