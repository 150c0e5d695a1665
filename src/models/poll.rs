use std::borrow::Cow;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;
use validator::{Validate, ValidationError};

pub const MAX_OPTION_TEXT_LEN: usize = 100;

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct Poll {
    pub id: Uuid,
    pub post_id: Uuid,
    pub allow_multiple: bool,
    pub max_choices: Option<i32>,
    pub ends_at: Option<DateTime<Utc>>,
    pub total_votes: i32,
    pub created_at: DateTime<Utc>,
}

impl Poll {
    pub fn has_ended_at(&self, now: DateTime<Utc>) -> bool {
        self.ends_at.is_some_and(|ends_at| now > ends_at)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, FromRow)]
pub struct PollOption {
    pub id: Uuid,
    pub poll_id: Uuid,
    pub text: String,
    #[serde(rename = "order")]
    pub position: i32,
    pub vote_count: i32,
}

// Create poll request
#[derive(Debug, Clone, Validate, Deserialize)]
#[validate(schema(function = "validate_choice_policy"))]
pub struct CreatePollRequest {
    #[validate(
        length(min = 3, max = 6, message = "A poll needs between 3 and 6 options"),
        custom(function = "validate_option_texts")
    )]
    pub options: Vec<String>,
    #[serde(default)]
    pub allow_multiple: bool,
    pub max_choices: Option<i32>,
    pub ends_at: Option<DateTime<Utc>>,
}

fn validate_option_texts(options: &[String]) -> Result<(), ValidationError> {
    for text in options {
        let text = text.trim();
        if text.is_empty() {
            return Err(ValidationError::new("empty_option")
                .with_message(Cow::from("Poll options cannot be empty")));
        }
        if text.chars().count() > MAX_OPTION_TEXT_LEN {
            return Err(ValidationError::new("option_too_long")
                .with_message(Cow::from("Poll option is too long (max 100 chars)")));
        }
    }
    Ok(())
}

fn validate_choice_policy(request: &CreatePollRequest) -> Result<(), ValidationError> {
    if let Some(max) = request.max_choices {
        if !request.allow_multiple {
            return Err(ValidationError::new("max_choices_single")
                .with_message(Cow::from("max_choices requires allow_multiple")));
        }
        if max < 1 || max as usize > request.options.len() {
            return Err(ValidationError::new("max_choices_range")
                .with_message(Cow::from("max_choices must be between 1 and the option count")));
        }
    }
    if request.ends_at.is_some_and(|ends_at| ends_at <= Utc::now()) {
        return Err(ValidationError::new("ends_at_past")
            .with_message(Cow::from("ends_at must be in the future")));
    }
    Ok(())
}

/// A poll ready to be written, with options already numbered.
#[derive(Debug, Clone)]
pub struct NewPoll {
    pub poll: Poll,
    pub options: Vec<PollOption>,
}

impl NewPoll {
    pub fn from_request(post_id: Uuid, request: &CreatePollRequest, now: DateTime<Utc>) -> Self {
        let poll_id = Uuid::new_v4();
        let options = request
            .options
            .iter()
            .enumerate()
            .map(|(position, text)| PollOption {
                id: Uuid::new_v4(),
                poll_id,
                text: text.trim().to_string(),
                position: position as i32,
                vote_count: 0,
            })
            .collect();

        Self {
            poll: Poll {
                id: poll_id,
                post_id,
                allow_multiple: request.allow_multiple,
                max_choices: request.max_choices,
                ends_at: request.ends_at,
                total_votes: 0,
                created_at: now,
            },
            options,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct PollVoteRequest {
    #[serde(default)]
    pub option_ids: Vec<Uuid>,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct OptionResult {
    pub id: Uuid,
    pub text: String,
    pub order: i32,
    pub vote_count: i32,
    pub percentage: i32,
}

#[derive(Debug, Clone, Serialize)]
pub struct PollResults {
    pub poll_id: Uuid,
    pub post_id: Uuid,
    pub total_votes: i32,
    pub options: Vec<OptionResult>,
    pub allow_multiple: bool,
    pub max_choices: Option<i32>,
    pub ends_at: Option<DateTime<Utc>>,
    pub is_ended: bool,
    pub user_choices: Vec<Uuid>,
}

impl PollResults {
    pub fn new(
        poll: &Poll,
        options: &[PollOption],
        user_choices: Vec<Uuid>,
        now: DateTime<Utc>,
    ) -> Self {
        let options = options
            .iter()
            .map(|option| OptionResult {
                id: option.id,
                text: option.text.clone(),
                order: option.position,
                vote_count: option.vote_count,
                percentage: percentage(option.vote_count, poll.total_votes),
            })
            .collect();

        Self {
            poll_id: poll.id,
            post_id: poll.post_id,
            total_votes: poll.total_votes,
            options,
            allow_multiple: poll.allow_multiple,
            max_choices: poll.max_choices,
            ends_at: poll.ends_at,
            is_ended: poll.has_ended_at(now),
            user_choices,
        }
    }
}

/// Share of `total` as a whole percent, rounded half away from zero.
pub fn percentage(vote_count: i32, total: i32) -> i32 {
    if total <= 0 {
        return 0;
    }
    (f64::from(vote_count) / f64::from(total) * 100.0).round() as i32
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn request(options: &[&str]) -> CreatePollRequest {
        CreatePollRequest {
            options: options.iter().map(|s| s.to_string()).collect(),
            allow_multiple: false,
            max_choices: None,
            ends_at: None,
        }
    }

    #[test]
    fn percentage_rounds_and_handles_empty_polls() {
        assert_eq!(percentage(0, 0), 0);
        assert_eq!(percentage(1, 3), 33);
        assert_eq!(percentage(2, 3), 67);
        assert_eq!(percentage(1, 8), 13);
        assert_eq!(percentage(4, 4), 100);
    }

    #[test]
    fn option_count_must_be_three_to_six() {
        assert!(request(&["a", "b"]).validate().is_err());
        assert!(request(&["a", "b", "c"]).validate().is_ok());
        assert!(request(&["a", "b", "c", "d", "e", "f"]).validate().is_ok());
        assert!(request(&["a", "b", "c", "d", "e", "f", "g"]).validate().is_err());
    }

    #[test]
    fn blank_or_long_options_are_rejected() {
        assert!(request(&["a", "  ", "c"]).validate().is_err());
        let long = "x".repeat(MAX_OPTION_TEXT_LEN + 1);
        assert!(request(&["a", "b", &long]).validate().is_err());
    }

    #[test]
    fn max_choices_needs_multi_select_and_a_sane_bound() {
        let mut req = request(&["a", "b", "c"]);
        req.max_choices = Some(2);
        assert!(req.validate().is_err());

        req.allow_multiple = true;
        assert!(req.validate().is_ok());

        req.max_choices = Some(4);
        assert!(req.validate().is_err());

        req.max_choices = Some(0);
        assert!(req.validate().is_err());
    }

    #[test]
    fn deadline_must_be_in_the_future() {
        let mut req = request(&["a", "b", "c"]);
        req.ends_at = Some(Utc::now() - Duration::minutes(1));
        assert!(req.validate().is_err());
        req.ends_at = Some(Utc::now() + Duration::days(1));
        assert!(req.validate().is_ok());
    }

    #[test]
    fn new_poll_numbers_options_in_submission_order() {
        let new_poll =
            NewPoll::from_request(Uuid::new_v4(), &request(&[" x ", "y", "z"]), Utc::now());
        let orders: Vec<_> = new_poll.options.iter().map(|o| o.position).collect();
        assert_eq!(orders, vec![0, 1, 2]);
        assert_eq!(new_poll.options[0].text, "x");
        assert!(new_poll.options.iter().all(|o| o.poll_id == new_poll.poll.id));
    }
}
