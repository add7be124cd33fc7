//! Evidence assembly: the author's description and the linked issue's spec.

use serde::{Deserialize, Serialize};
use speccheck_core::SpecCheckError;

use crate::context::PullRequestContext;
use crate::llm::{ChatMessage, Role};
use crate::references;
use crate::tracker::IssueTracker;

/// Login attached to the specification block.
const SPEC_LOGIN: &str = "assistant";

/// One labeled block of evidence shown to the judge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvidenceBlock {
    /// Who the block is attributed to.
    pub login: String,
    /// Labeled block text.
    pub body: String,
}

/// The specification a pull request is judged against.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Specification {
    /// Number of the linked issue.
    pub issue_number: u64,
    /// Issue body.
    pub text: String,
}

/// Ordered evidence for one review: the author's description first, then the spec.
///
/// The order is part of the contract with the judging prompt, which treats the
/// second block as the specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct EvidenceSet {
    blocks: Vec<EvidenceBlock>,
}

impl EvidenceSet {
    /// Build the evidence for `author`'s pull request against `spec`.
    ///
    /// # Examples
    ///
    /// ```
    /// use speccheck_review::evidence::{EvidenceSet, Specification};
    ///
    /// let spec = Specification { issue_number: 42, text: "Add a health endpoint".into() };
    /// let evidence = EvidenceSet::new("octocat", "Resolves #42", &spec);
    /// assert_eq!(evidence.blocks()[0].login, "octocat");
    /// assert!(evidence.blocks()[1].body.starts_with("#42 Specification:"));
    /// ```
    pub fn new(author: &str, description: &str, spec: &Specification) -> Self {
        let blocks = vec![
            EvidenceBlock {
                login: author.to_string(),
                body: format!("{author}'s pull request description:\n{description}"),
            },
            EvidenceBlock {
                login: SPEC_LOGIN.to_string(),
                body: format!("#{} Specification: \n{}", spec.issue_number, spec.text),
            },
        ];
        Self { blocks }
    }

    /// The blocks in replay order.
    pub fn blocks(&self) -> &[EvidenceBlock] {
        &self.blocks
    }

    /// The seed conversation: a single system message carrying the serialized evidence.
    ///
    /// # Errors
    ///
    /// Returns [`SpecCheckError::Serialization`] if the evidence cannot be encoded.
    pub fn seed_conversation(&self) -> Result<Vec<ChatMessage>, SpecCheckError> {
        let serialized = serde_json::to_string(&self.blocks)?;
        Ok(vec![ChatMessage::new(
            Role::System,
            format!("This pull request context: \n{serialized}"),
        )])
    }
}

/// Output of the assembler: the resolved spec, its evidence, and the seed conversation.
#[derive(Debug, Clone)]
pub struct AssembledEvidence {
    /// The governing specification.
    pub specification: Specification,
    /// Evidence blocks in replay order.
    pub evidence: EvidenceSet,
    /// Seed conversation replayed into the review stage.
    pub seed: Vec<ChatMessage>,
}

/// Resolve the governing issue of `ctx`, fetch it, and assemble the evidence.
///
/// # Errors
///
/// Returns [`SpecCheckError::NoLinkedIssue`] when the body references nothing,
/// or [`SpecCheckError::Fetch`] when the issue cannot be retrieved.
pub async fn assemble(
    tracker: &dyn IssueTracker,
    ctx: &PullRequestContext,
) -> Result<AssembledEvidence, SpecCheckError> {
    let pr = &ctx.pull_request;
    let Some(issue_number) = references::governing_issue(&ctx.body) else {
        tracing::error!(pull_request = %pr, "no linked issues or pull requests found");
        return Err(SpecCheckError::NoLinkedIssue {
            pull_number: pr.number,
        });
    };
    tracing::info!(pull_request = %pr, issue = issue_number, "resolved governing issue");

    let issue = tracker
        .fetch_issue(&pr.owner, &pr.repo, issue_number)
        .await
        .map_err(|e| {
            SpecCheckError::fetch(format!("linked issue #{issue_number} of {pr}"), e)
        })?;

    let specification = Specification {
        issue_number: issue.number,
        text: issue.body.unwrap_or_default(),
    };
    let evidence = EvidenceSet::new(&ctx.author, &ctx.body, &specification);
    let seed = evidence.seed_conversation()?;

    Ok(AssembledEvidence {
        specification,
        evidence,
        seed,
    })
}
