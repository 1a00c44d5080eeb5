//! ABOUTME: System prompts per agent role and user-prompt assembly
//! ABOUTME: Prompts always carry the fenced-path format directive so output is extractable

use crate::digest::digest_value;
use agentflow_core::{AgentRole, Task};

/// Directive appended to every user prompt so the model emits files the
/// extractor can parse.
pub const FORMAT_DIRECTIVE: &str = "IMPORTANT: Format your code output using markdown code blocks with filenames:\n```python:path/to/file.py\n# Your code here\n```\n\nOr specify files explicitly:\nFile: `path/to/file.py`\n```python\n# Your code here\n```";

/// System prompt for a role.
///
/// `languages` parameterizes the developer prompt; other roles ignore it.
pub fn system_prompt(role: AgentRole, languages: &[String]) -> String {
    match role {
        AgentRole::BusinessAnalyst => "You are an expert Business Analyst agent. Your responsibilities include:\n\n1. Requirements Analysis: Break down requirements into user stories and acceptance criteria\n2. Stakeholder Mapping: Identify the actors and their goals\n3. Scope Definition: Separate must-have from nice-to-have functionality\n4. Risk Identification: Flag ambiguities and open questions early\n\nWhen analyzing requirements:\n- Write user stories in the 'As a ... I want ... so that ...' form\n- Attach concrete, testable acceptance criteria to every story\n- Call out assumptions explicitly\n\nAlways produce structured documents that downstream engineering agents can build from.".to_string(),
        AgentRole::Developer => format!(
            "You are an expert Software Developer agent. Your responsibilities include:\n\n1. Code Implementation: Write clean, maintainable, and efficient code\n2. Architecture Design: Design scalable and robust software architectures\n3. Code Review: Review code for quality, performance, and best practices\n4. Technical Documentation: Document code, APIs, and technical decisions\n5. Debugging: Identify and fix bugs in existing code\n6. Testing: Write unit tests and integration tests\n\nProgramming Languages: {}\n\nWhen implementing features:\n- Follow SOLID principles and design patterns\n- Write clean, self-documenting code\n- Include proper error handling and logging\n- Add comprehensive tests\n- Consider performance and scalability\n\nAlways provide complete, production-ready code with all necessary imports and dependencies.",
            languages.join(", ")
        ),
        AgentRole::QaEngineer => "You are an expert QA Engineer agent. Your responsibilities include:\n\n1. Test Planning: Derive test cases from requirements and acceptance criteria\n2. Test Implementation: Write automated unit, integration, and regression tests\n3. Bug Analysis: Reproduce reported defects and isolate root causes\n4. Coverage Assessment: Identify untested paths and edge cases\n\nWhen writing tests:\n- Cover the happy path, error paths, and boundary conditions\n- Keep tests deterministic and independent of each other\n- Name tests after the behavior they verify\n\nAlways provide runnable test code with any fixtures it needs.".to_string(),
        AgentRole::DevopsEngineer => "You are an expert DevOps Engineer agent. Your responsibilities include:\n\n1. Infrastructure as Code: Author Dockerfiles, compose files, and deployment manifests\n2. CI/CD: Define build, test, and release pipelines\n3. Configuration Management: Externalize configuration and secrets handling\n4. Observability: Wire up logging, metrics, and health checks\n\nWhen producing infrastructure:\n- Prefer minimal, reproducible images and pinned versions\n- Keep environment-specific values out of the artifacts themselves\n- Document any manual steps that cannot be automated\n\nAlways provide complete infrastructure files ready to run.".to_string(),
        AgentRole::TechnicalWriter => "You are an expert Technical Writer agent. Your responsibilities include:\n\n1. User Documentation: Write READMEs, guides, and tutorials\n2. API Documentation: Document endpoints, parameters, and responses\n3. Operational Documentation: Describe deployment and troubleshooting procedures\n4. Release Notes: Summarize changes for end users\n\nWhen writing documentation:\n- Lead with what the reader needs to accomplish\n- Include working examples and expected output\n- Keep reference material separate from tutorials\n\nAlways produce complete Markdown documents.".to_string(),
    }
}

/// Assemble the user prompt for a task: description, context dump, and the
/// format directive. Input-file content is appended separately by the
/// runtime.
pub fn build_user_prompt(task: &Task) -> String {
    let mut prompt = format!("Task: {}\n", task.description);

    let context_lines: Vec<String> = task
        .context
        .iter()
        .filter(|(key, _)| key.as_str() != "files")
        .map(|(key, value)| {
            // Plain strings (the requirement itself) flow through raw; the
            // prompt budget layer handles oversized prompts. Structured
            // upstream results are digested instead.
            let rendered = match value {
                serde_json::Value::String(s) => s.clone(),
                other => digest_value(other),
            };
            format!("- {key}: {rendered}")
        })
        .collect();
    if !context_lines.is_empty() {
        prompt.push_str("\nContext:\n");
        prompt.push_str(&context_lines.join("\n"));
        prompt.push('\n');
    }

    prompt.push('\n');
    prompt.push_str(FORMAT_DIRECTIVE);
    prompt
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_developer_prompt_lists_languages() {
        let prompt = system_prompt(
            AgentRole::Developer,
            &["python".to_string(), "rust".to_string()],
        );
        assert!(prompt.contains("Programming Languages: python, rust"));
    }

    #[test]
    fn test_each_role_has_a_distinct_prompt() {
        let roles = [
            AgentRole::BusinessAnalyst,
            AgentRole::Developer,
            AgentRole::QaEngineer,
            AgentRole::DevopsEngineer,
            AgentRole::TechnicalWriter,
        ];
        let prompts: Vec<String> = roles.iter().map(|r| system_prompt(*r, &[])).collect();
        for (i, a) in prompts.iter().enumerate() {
            for b in prompts.iter().skip(i + 1) {
                assert_ne!(a, b);
            }
        }
    }

    #[test]
    fn test_user_prompt_includes_context_and_directive() {
        let task = Task::new("dev", "Implement the endpoint")
            .with_context_value("requirement", json!("Hello World API"))
            .with_context_value("files", json!(["src/app.py"]));
        let prompt = build_user_prompt(&task);
        assert!(prompt.contains("Task: Implement the endpoint"));
        assert!(prompt.contains("- requirement: Hello World API"));
        // The files key feeds the relevant-files section, not the context dump.
        assert!(!prompt.contains("- files:"));
        assert!(prompt.contains("markdown code blocks with filenames"));
    }
}
