//! Instruction texts sent to the backend.

/// Build the comparison instruction for two named images.
///
/// The wording is fixed apart from the two identifiers; the backend is asked
/// for a bare numbered list so that [`crate::response::parse_differences`]
/// can split it when validation is enabled.
pub fn comparison_prompt(first_id: &str, second_id: &str) -> String {
    format!(
        "You are a helpful assistant tasked with comparing two scanned revisions of the same \
tax form ({first_id} and {second_id}). Analyze the content of both images and identify 5-7 key \
differences in fields, instructions, or structure between these two form images. Ignore minor \
formatting or stylistic changes. Return the differences as a numbered list, with each item \
describing the difference and specifying what changed between the two versions.

Example output:
1. Header Information: The first image has no website link, while the second image includes a \
link to the agency website.
2. Identification Number: The first image uses \"Taxpayer identification number,\" while the \
second image uses \"Employer identification number.\"

Provide only the numbered list, without additional explanation.
"
    )
}

/// System message for diff summaries.
pub const SUMMARY_SYSTEM_PROMPT: &str = "You are a precise summarizer of document differences.";

/// Ask for a bullet summary of one masked unified diff.
pub fn summary_prompt(comparison: &str, diff: &str) -> String {
    format!(
        "You are an expert in summarizing document differences in a clear, human-readable \
format. Below is a unified diff from a masked comparison report, showing changes between two \
documents ({comparison}). The PII has been masked (e.g., <PERSON>, <PHONE_NUMBER>). Convert \
this diff into a concise, natural language summary, focusing on meaningful field changes. Use \
bullet points to list each change, and group by field where possible. Ignore minor formatting \
differences (e.g., extra spaces) unless they affect meaning. If no significant changes exist, \
state that clearly.

Diff:
```
{diff}
```

Example output:
- **Date of Birth**: Changed from <DATE_TIME> to <DATE_TIME>.
- **Address**: Updated from <LOCATION> to <LOCATION>.

Provide only the bullet-point summary, no additional commentary.
"
    )
}
