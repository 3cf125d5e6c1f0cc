//! Solver agent — model-backed with reflection; turns a brief into a
//! solution carrying prose and a runnable snippet.

use std::sync::Arc;

use super::{agent_name, AgentStack, Solution, TaskBrief};
use crate::agent::{json_decoder, json_encoder, AgentBuilder, AgentDefinition};
use crate::pipeline::process::{self, MaxReflections};
use crate::types::{Error, Result};

pub const NAME: &str = "solver";

const SOLVE_PROMPT: &str = "You are the solver stage of an engineering assistant. \
Solve the task brief below. Reply with a JSON object containing exactly two keys: \
\"explanation\" (a short prose answer) and \"code\" (a runnable python3 snippet \
demonstrating it). Reply with JSON only.\n\nTask brief:\n{input}";

/// Pull the first balanced JSON object out of a model response, tolerating
/// prose or code fences around it.
pub fn extract_json_object(response: &str) -> Result<serde_json::Value> {
    let start = response
        .find('{')
        .ok_or_else(|| Error::model("response contains no JSON object"))?;
    let end = response
        .rfind('}')
        .ok_or_else(|| Error::model("response contains no closing brace"))?;
    if end < start {
        return Err(Error::model("response braces are unbalanced"));
    }
    serde_json::from_str(&response[start..=end])
        .map_err(|e| Error::model(format!("response is not valid JSON: {}", e)))
}

pub async fn definition(stack: &AgentStack) -> Result<AgentDefinition<TaskBrief, Solution>> {
    let template = stack.prompts.get_or_seed("solver_solution", SOLVE_PROMPT).await?;

    let solve = process::model(
        "solve",
        MaxReflections::new(2),
        Arc::clone(&stack.model),
        stack.model_id.clone(),
        move |brief: &TaskBrief, _ctx| template.replace("{input}", &brief.brief),
        |brief: &TaskBrief, response| {
            let value = extract_json_object(response)?;
            let explanation = value
                .get("explanation")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::model("response missing 'explanation'"))?;
            let code = value
                .get("code")
                .and_then(|v| v.as_str())
                .ok_or_else(|| Error::model("response missing 'code'"))?;
            Ok(Solution {
                brief: brief.brief.clone(),
                explanation: explanation.to_string(),
                code: code.to_string(),
            })
        },
        Some(stack.sink.clone()),
    );

    Ok(AgentBuilder::new(agent_name(NAME)?)
        .input(json_decoder())
        .pipeline(solve)
        .output_to(agent_name(super::executor::NAME)?, json_encoder())
        .build())
}
