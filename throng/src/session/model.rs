//! Wire model of the backend the sessions talk to.
//!
//! Incoming payloads are decoded leniently: identifiers and weights may arrive as
//! JSON strings or numbers, and envelope flags default to `false` when absent.

use serde::{de, Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Login request.
#[derive(Debug, Serialize)]
pub struct Credentials<'a> {
    pub account: &'a str,
    pub password: &'a str,
}

/// Payload of a successful login.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResult {
    pub token: String,
    pub student_info: UserInfo,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(default)]
    pub user_name: Option<String>,
}

/// Reply of the work-discovery endpoint.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Discovery {
    #[serde(default)]
    pub success: bool,
    #[serde(default)]
    pub is_have_task: bool,
    /// Batches are kept raw; only the one a session works on is decoded.
    #[serde(default)]
    pub result: Option<Vec<Value>>,
}

/// A published collection of work items addressed to the session's user.
#[derive(Debug, Clone, Deserialize)]
pub struct Batch {
    pub evaluation: Evaluation,
    #[serde(rename = "scaleList", default)]
    pub items: Vec<WorkItem>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(deserialize_with = "string_or_number")]
    pub create_by: String,
    #[serde(default)]
    pub task_name: Option<String>,
}

/// One unit of assigned work (a questionnaire).
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct WorkItem {
    #[serde(deserialize_with = "string_or_number")]
    pub id: String,
    #[serde(rename = "scaleName", default)]
    pub name: String,
    #[serde(rename = "optionVo", default)]
    pub groups: Vec<OptionGroup>,
}

/// Mutually exclusive choices; a session picks exactly one.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct OptionGroup {
    #[serde(rename = "questionOptionScoreList", default)]
    pub options: Vec<AnswerOption>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AnswerOption {
    #[serde(rename = "contentOptions")]
    pub content: String,
    /// Scoring text exactly as the backend sent it, checked to be numeric.
    #[serde(rename = "scoring", deserialize_with = "weight")]
    pub weight: String,
    #[serde(default, deserialize_with = "opt_string_or_number")]
    pub subscript: Option<String>,
}

/// The option chosen for one group, in the shape the submission endpoint expects.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Answer {
    #[serde(rename = "contentOptions")]
    pub content: String,
    pub scoring: String,
    pub subscript: String,
}

/// Submission request for one work item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Submission<'a> {
    pub create_by: &'a str,
    pub emotional_vos: Vec<Value>,
    pub eye_move_data: &'static str,
    pub question_option_score_list: &'a [Answer],
    pub resource_urls: &'static str,
    pub scale_id: &'a str,
    pub task_id: &'a str,
    pub use_time: &'static str,
    pub user_id: &'a str,
}

impl<'a> Submission<'a> {
    /// Fixed completion time reported for every submission.
    pub const USE_TIME: &'static str = "00:07:033";

    pub fn new(
        batch_id: &'a str,
        creator_id: &'a str,
        item_id: &'a str,
        user_id: &'a str,
        answers: &'a [Answer],
    ) -> Self {
        Self {
            create_by: creator_id,
            emotional_vos: Vec::new(),
            eye_move_data: "",
            question_option_score_list: answers,
            resource_urls: "",
            scale_id: item_id,
            task_id: batch_id,
            use_time: Self::USE_TIME,
            user_id,
        }
    }
}

/// Report-fetch request confirming one completed item.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Confirmation<'a> {
    pub task_id: &'a str,
    pub stu_id: &'a str,
    pub scale_id: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum Scalar {
    Str(String),
    Num(serde_json::Number),
}

impl Scalar {
    fn into_string(self) -> String {
        match self {
            Scalar::Str(s) => s,
            Scalar::Num(n) => n.to_string(),
        }
    }
}

fn string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    Scalar::deserialize(d).map(Scalar::into_string)
}

fn opt_string_or_number<'de, D: Deserializer<'de>>(d: D) -> Result<Option<String>, D::Error> {
    Ok(Option::<Scalar>::deserialize(d)?.map(Scalar::into_string))
}

fn weight<'de, D: Deserializer<'de>>(d: D) -> Result<String, D::Error> {
    match Scalar::deserialize(d)? {
        Scalar::Num(n) => Ok(n.to_string()),
        Scalar::Str(s) if s.trim().parse::<f64>().is_ok() => Ok(s),
        Scalar::Str(s) => Err(de::Error::custom(format!("weight '{s}' is not numeric"))),
    }
}
