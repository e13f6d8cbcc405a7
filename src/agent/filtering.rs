//! Data filtering agent
//!
//! Removes data types the regulations and consents do not allow and
//! anonymizes when asked. The assistant's reply *is* the filtered file;
//! it is written verbatim to the output path.

use std::path::Path;

use tracing::info;

use super::context::AgentContext;
use super::driver::NoTools;
use super::tools::{AgentKind, FilteringArgs, ToolError};

/// Filtering requirements sent ahead of the patient data
pub fn filtering_query(args: &FilteringArgs) -> String {
    let mut query = format!(
        "Please process the attached patient data file.\n\n\
         The following data types are allowed to be shared: {}.\n",
        args.allowed_data_types
    );
    if args.anonymization_required {
        query.push_str(
            "Also, make sure the included data is properly anonymized before sharing, as anonymization is required in this case.",
        );
    } else {
        query.push_str("Date anonymization is not required.");
    }
    query
}

/// Follow-up request asking the agent to re-filter
pub fn modification_query(user_request: &str) -> String {
    format!(
        "The user asked for the extra modifications as follows: {}. Please re-filter the file again.",
        user_request
    )
}

fn requirement_messages(requirements: &str, patient_data: &str) -> [String; 2] {
    [
        format!("These are the data sharing requirements:\n{}", requirements),
        format!("This is the patient data:\n{}", patient_data),
    ]
}

async fn read_patient_file(path: &Path) -> Result<String, ToolError> {
    tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ToolError::Io {
            path: path.display().to_string(),
            source,
        })
}

async fn write_filtered(path: &Path, contents: &str) -> Result<(), ToolError> {
    tokio::fs::write(path, contents)
        .await
        .map_err(|source| ToolError::Io {
            path: path.display().to_string(),
            source,
        })
}

/// Filter `input_file` under `requirements`, writing the result to the
/// context's output path
pub async fn filter(
    ctx: &AgentContext,
    thread_id: &str,
    requirements: &str,
    input_file: &Path,
) -> Result<String, ToolError> {
    ctx.progress()
        .notify("📝 Calling Data Filtering Agent to process the patient file...");
    ctx.progress().notify("📂 Reading uploaded patient data...");
    let patient_data = read_patient_file(input_file).await?;

    ctx.progress()
        .notify("⚙️ Filtering out restricted fields and applying anonymization...");
    let outcome = ctx
        .driver
        .drive_messages(
            AgentKind::Filtering,
            thread_id,
            &ctx.assistants.filtering,
            &requirement_messages(requirements, &patient_data),
            &NoTools(AgentKind::Filtering),
        )
        .await?;

    ctx.progress().notify("📂 Saving filtered data to new file...");
    write_filtered(&ctx.output_path, &outcome.text).await?;
    info!(output = %ctx.output_path.display(), bytes = outcome.text.len(), "Filtered file saved");
    ctx.progress().notify("✅ Filtering and anonymization completed!");
    Ok("✅ Data Filtered Successfully".to_string())
}

/// Apply the user's extra modifications and overwrite the filtered file
pub async fn refine(ctx: &AgentContext, thread_id: &str, user_request: &str) -> Result<String, ToolError> {
    ctx.progress()
        .notify("📝 Calling the Data Filtering Agent for further data modifications...");
    let outcome = ctx
        .driver
        .drive(
            AgentKind::Filtering,
            thread_id,
            &ctx.assistants.filtering,
            &modification_query(user_request),
            &NoTools(AgentKind::Filtering),
        )
        .await?;
    write_filtered(&ctx.output_path, &outcome.text).await?;
    info!(output = %ctx.output_path.display(), "Filtered file rewritten");
    Ok("✅ Data Filtered Again Successfully".to_string())
}

/// Answer a question about the filtering, with the patient data attached
pub async fn explain(
    ctx: &AgentContext,
    thread_id: &str,
    question: &str,
    input_file: &Path,
) -> Result<String, ToolError> {
    ctx.progress()
        .notify("📝 Routing your question to the Data Filtering Agent for clarification...");
    let patient_data = read_patient_file(input_file).await?;
    let outcome = ctx
        .driver
        .drive_messages(
            AgentKind::Filtering,
            thread_id,
            &ctx.assistants.filtering,
            &requirement_messages(question, &patient_data),
            &NoTools(AgentKind::Filtering),
        )
        .await?;
    Ok(outcome.text)
}
