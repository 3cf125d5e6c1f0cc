//! Presenter agent — terminal; formats the user-facing answer and carries
//! the guardrail stage.

use std::sync::Arc;

use super::{agent_name, AgentStack, ExecutionReport, FinalAnswer};
use crate::agent::{
    json_decoder, json_encoder, AgentBuilder, AgentDefinition, UpstreamNotice, UpstreamReaction,
};
use crate::pipeline::process;
use crate::types::Result;

pub const NAME: &str = "presenter";

/// Answers longer than this are truncated before leaving the system.
const MAX_ANSWER_CHARS: usize = 4000;

fn compose_answer(report: &ExecutionReport) -> String {
    let mut text = report.explanation.trim().to_string();

    if !report.code.trim().is_empty() {
        text.push_str("\n\nCode:\n");
        text.push_str(report.code.trim());
    }

    if report.ran {
        if !report.stdout.trim().is_empty() {
            text.push_str("\n\nExecution output:\n");
            text.push_str(report.stdout.trim());
        }
    } else if report.exit_code != 0 && !report.code.trim().is_empty() {
        text.push_str(&format!(
            "\n\nNote: the snippet exited with code {}.",
            report.exit_code
        ));
        if !report.stderr.trim().is_empty() {
            text.push_str("\nstderr:\n");
            text.push_str(report.stderr.trim());
        }
    }

    text
}

pub async fn definition(stack: &AgentStack) -> Result<AgentDefinition<ExecutionReport, FinalAnswer>> {
    let compose = process::pure("compose", |report: ExecutionReport| FinalAnswer {
        text: compose_answer(&report),
    });

    let truncate = process::when(
        "truncate_long",
        |answer: &FinalAnswer| answer.text.chars().count() > MAX_ANSWER_CHARS,
        process::pure("truncate", |answer: FinalAnswer| {
            let mut text: String = answer.text.chars().take(MAX_ANSWER_CHARS).collect();
            text.push_str("\n[truncated]");
            FinalAnswer { text }
        }),
    );

    let upstream = Arc::new(|notice: UpstreamNotice| match notice {
        UpstreamNotice::Failure(failure) => UpstreamReaction::Continue(ExecutionReport {
            explanation: format!(
                "Sorry - the pipeline could not complete this request. \
                 Agent {} reported: {}",
                failure.from_agent, failure.error
            ),
            code: String::new(),
            stdout: String::new(),
            stderr: String::new(),
            exit_code: 0,
            ran: false,
        }),
        UpstreamNotice::Rejection(rejection) => UpstreamReaction::Reject {
            policy: rejection.guardrail_name,
            reason: rejection.reason,
        },
    });

    Ok(AgentBuilder::new(agent_name(NAME)?)
        .input(json_decoder())
        .on_upstream(upstream)
        .pipeline(compose.then(truncate))
        .terminal(json_encoder())
        .guardrail(Arc::clone(&stack.guardrails))
        .build())
}
