use crate::*;

/// One option of a proposal's choice set, e.g. `inFavor`
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(transparent)]
pub struct ChoiceTag(String);

impl ChoiceTag {
    pub fn new<S: Into<String>>(tag: S) -> Self {
        ChoiceTag(tag.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ChoiceTag {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ChoiceTag {
    fn from(tag: &str) -> Self {
        ChoiceTag::new(tag)
    }
}

/// The choice set used when a request does not declare one
pub fn default_choice_set() -> Vec<ChoiceTag> {
    vec!["inFavor".into(), "against".into(), "abstain".into()]
}

/// A single voter's encrypted selection, filed under the option it counts towards
#[derive(Clone, Debug)]
pub struct EncryptedBallot {
    pub choice: ChoiceTag,
    pub ciphertext: Ciphertext,
}

/// Everything needed for one tally run. Built per request and dropped afterwards.
#[derive(Clone, Debug)]
pub struct ProposalTallyRequest {
    pub proposal_id: String,
    pub ballots: Vec<EncryptedBallot>,
    pub choice_set: Vec<ChoiceTag>,
}

impl ProposalTallyRequest {
    /// Check the shape of the request: an identifier, and a non-empty choice set with no
    /// repeated options.
    pub fn validate(&self) -> Result<(), Error> {
        if self.proposal_id.trim().is_empty() {
            return Err(Error::MalformedRequest("proposalId is empty".to_owned()));
        }
        if self.choice_set.is_empty() {
            return Err(Error::MalformedRequest("voteOptions is empty".to_owned()));
        }
        let mut seen = std::collections::HashSet::with_capacity(self.choice_set.len());
        for choice in self.choice_set.iter() {
            if choice.as_str().is_empty() {
                return Err(Error::MalformedRequest(
                    "voteOptions contains an empty option".to_owned(),
                ));
            }
            if !seen.insert(choice) {
                return Err(Error::MalformedRequest(format!(
                    "voteOptions lists {} more than once",
                    choice
                )));
            }
        }
        Ok(())
    }
}
