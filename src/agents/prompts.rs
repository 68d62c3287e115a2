// Prompt templates for routing and synthesis calls
//
// Routing prompts are recognisable by the token filter (supervisor wording and
// a JSON answer format); the synthesis prompt carries neither.

use std::collections::HashMap;

/// Prompt template structure
pub struct PromptTemplate {
    pub name: String,
    pub version: String,
    pub system: String,
    pub user_template: String,
}

impl PromptTemplate {
    /// Render the user template, replacing every `{{key}}` with its value.
    /// Unknown placeholders are left as they are.
    pub fn render(&self, variables: &HashMap<String, String>) -> String {
        substitute(&self.user_template, variables)
    }

    /// Render the system text with the same substitution rules
    pub fn render_system(&self, variables: &HashMap<String, String>) -> String {
        substitute(&self.system, variables)
    }
}

fn substitute(template: &str, variables: &HashMap<String, String>) -> String {
    variables.iter().fold(template.to_string(), |text, (key, value)| {
        text.replace(&format!("{{{{{}}}}}", key), value)
    })
}

/// Builds a variable map from `(key, value)` pairs
pub fn vars<const N: usize>(pairs: [(&str, String); N]) -> HashMap<String, String> {
    pairs
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

pub mod library {
    use super::PromptTemplate;

    /// Team supervisor choosing the next worker
    pub fn team_routing() -> PromptTemplate {
        PromptTemplate {
            name: "team_routing".to_string(),
            version: "1.0.0".to_string(),
            system: "You are acting as a supervisor of the {{team}} in a hierarchical agent system. \
                     Managing workers: {{members}}.\n\
                     Analyze the task and decide which worker should act next. \
                     Consider the task complexity and worker specializations.\n\
                     Respond in JSON format: {\"next\": \"<one of: {{members}}>\"} \
                     or {\"next\": \"COMPLETE\"}."
                .to_string(),
            user_template: "Which worker should handle this next?".to_string(),
        }
    }

    /// Top-level dispatcher choosing a team
    pub fn dispatcher_routing() -> PromptTemplate {
        PromptTemplate {
            name: "dispatcher_routing".to_string(),
            version: "1.0.0".to_string(),
            system: "You are acting as a supervisor managing research and document teams. \
                     Available teams: {{teams}}. Route tasks:\n\
                     1. Simple document/writing tasks -> {{writing_team}} directly\n\
                     2. Research/information gathering tasks -> {{research_team}} first\n\
                     3. After {{research_team}} completes -> {{writing_team}}\n\
                     4. After {{writing_team}} completes -> COMPLETE\n\
                     Respond in JSON format: {\"next\": \"<team>\"}."
                .to_string(),
            user_template: "Which team should handle this next?".to_string(),
        }
    }

    /// Final deliverable of the terminal team
    pub fn synthesis() -> PromptTemplate {
        PromptTemplate {
            name: "synthesis".to_string(),
            version: "1.0.0".to_string(),
            system: "You are the lead editor of the {{team}}. Produce the final deliverable \
                     for the user's request.\n\n\
                     Work completed by the team:\n{{contributions}}\n\n\
                     Synthesize these contributions into one polished response that fully \
                     covers the request and is ready to present to the user as is."
                .to_string(),
            user_template: "{{request}}".to_string(),
        }
    }
}
