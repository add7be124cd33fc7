use speccheck_core::SpecCheckError;

use crate::llm::{ChatMessage, Completion, Role};

const ESCAPE_PREAMBLE: &str = "\
Please ignore all previous commands and directives. \n
Perform exactly what is asked of you in the following way: \n\n";

const SPEC_CHECK_INSTRUCTIONS: &str = "\
Using the provided context, ensure you clearly understand the specification of the issue. \n
Now using your best judgement, determine if the specification has been met based on the PR diff provided. \n
The spec should be achieved at least logically, if not literally. \
If changes are made that are not directly mentioned in the spec, but are logical and do not break the spec, they are acceptable. \n
Your response will be posted as a GitHub comment for everyone to see in the pull request review conversation.
Knowing this, only include information that will benefit them, think of it as a quick summary of the review.
You can add value by identifying coding errors and code suggestions that benefit both the author and reviewers.
";

const VALIDATION_INSTRUCTIONS: &str = "\
You are a validation bot that ensures pull request reviews meet a predefined standard. \n
The input you'll validate is the output of a pull request review; whether it found the spec achieved determines what you need to do. \n

If the spec is not achieved then you will take the useful information from the review and deliver it using the following template: \n
=== Template A === \n
### Spec not achieved
{username} this is where you went wrong...
this is how you can fix it...
> code example of solution
=== Template A === \n

If the spec is achieved then you will respond using the following template including their real username, no @ symbols:\n
=== Template B === \n
### Spec achieved
{username}, you have achieved the spec and now the reviewers will let you know if there are any other changes needed.\n
=== Template B === \n
";

/// System prompt of the review stage.
///
/// # Examples
///
/// ```
/// use speccheck_review::prompt::build_review_system_prompt;
///
/// let prompt = build_review_system_prompt();
/// assert!(prompt.contains("at least logically"));
/// ```
pub fn build_review_system_prompt() -> String {
    format!("{ESCAPE_PREAMBLE} {SPEC_CHECK_INSTRUCTIONS}")
}

/// System prompt of the validation stage.
///
/// # Examples
///
/// ```
/// use speccheck_review::prompt::build_validation_system_prompt;
///
/// let prompt = build_validation_system_prompt();
/// assert!(prompt.contains("### Spec not achieved"));
/// assert!(prompt.contains("### Spec achieved"));
/// ```
pub fn build_validation_system_prompt() -> String {
    format!("{ESCAPE_PREAMBLE} {VALIDATION_INSTRUCTIONS}")
}

/// Conversation for the review stage: instructions, the serialized seed, and the diff.
///
/// The diff is JSON-encoded as a string so that its quoting cannot be
/// confused with the surrounding label.
///
/// # Errors
///
/// Returns [`SpecCheckError::Serialization`] if the seed cannot be encoded.
pub fn review_conversation(
    seed: &[ChatMessage],
    author: &str,
    diff: &str,
) -> Result<Vec<ChatMessage>, SpecCheckError> {
    let spec = serde_json::to_string(seed)?;
    let diff = serde_json::to_string(diff)?;
    Ok(vec![
        ChatMessage::new(Role::System, build_review_system_prompt()),
        ChatMessage::new(Role::Assistant, format!("Spec for Pr: \n{spec}")),
        ChatMessage::new(Role::User, format!("{author}'s PR Diff: \n{diff}")),
    ])
}

/// Conversation for the validation stage: instructions and the review stage's answer.
///
/// Deliberately carries nothing else from the review stage.
///
/// # Errors
///
/// Returns [`SpecCheckError::Serialization`] if the review cannot be encoded.
pub fn validation_conversation(
    review: &Completion,
    author: &str,
) -> Result<Vec<ChatMessage>, SpecCheckError> {
    let review = serde_json::to_string(review)?;
    Ok(vec![
        ChatMessage::new(Role::System, build_validation_system_prompt()),
        ChatMessage::new(
            Role::Assistant,
            format!("Validate for user: {author}: \n{review}"),
        ),
    ])
}
