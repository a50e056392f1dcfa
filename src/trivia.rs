use rand::seq::SliceRandom;
use serde::Deserialize;
use thiserror::Error;
use tracing::instrument;
use url::Url;

use crate::pack::{AnswerOption, Difficulty, Question};

const BASE_URL: &str = "https://opentdb.com/";
const USER_AGENT: &str = concat!("quiz-configurator/", env!("CARGO_PKG_VERSION"));

pub const MIN_IMPORT_AMOUNT: u8 = 1;
pub const MAX_IMPORT_AMOUNT: u8 = 50;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriviaCategory {
    pub id: u32,
    pub name: String,
}

/// Import failures, each carrying the single message shown to the user.
#[derive(Debug, Error)]
pub enum TriviaError {
    #[error("Amount must be between {MIN_IMPORT_AMOUNT} and {MAX_IMPORT_AMOUNT}.")]
    InvalidAmount(u8),
    #[error("No internet connection. Please check your network connection and try again.")]
    Connection(#[source] reqwest::Error),
    #[error("Request timed out. Please check your internet connection and try again.")]
    Timeout(#[source] reqwest::Error),
    #[error("Unexpected response from Open Trivia Database.")]
    Malformed(#[source] reqwest::Error),
    #[error("No questions were returned from the Open Trivia Database.")]
    Empty,
    #[error("The Open Trivia Database returned questions that could not be processed.")]
    Unusable,
    #[error("{}", api_code_message(*.0))]
    Api(u8),
}

fn api_code_message(code: u8) -> String {
    match code {
        1 => "The API could not return enough questions for your query. \
              Try reducing the amount or relaxing the filters."
            .to_owned(),
        2 => "Invalid parameter supplied to the Open Trivia Database API.".to_owned(),
        3 => "Token not found. Please try again.".to_owned(),
        4 => "Token empty. Please try again.".to_owned(),
        other => format!("Unexpected response from Open Trivia Database (code {other})."),
    }
}

fn classify(error: reqwest::Error) -> TriviaError {
    if error.is_timeout() {
        TriviaError::Timeout(error)
    } else if error.is_decode() {
        TriviaError::Malformed(error)
    } else {
        TriviaError::Connection(error)
    }
}

#[derive(Debug, Deserialize)]
struct CategoryResponse {
    trivia_categories: Option<Vec<CategoryDto>>,
}

#[derive(Debug, Deserialize)]
struct CategoryDto {
    id: u32,
    name: String,
}

#[derive(Debug, Deserialize)]
struct QuestionsResponse {
    response_code: u8,
    results: Option<Vec<QuestionDto>>,
}

#[derive(Debug, Deserialize)]
struct QuestionDto {
    question: Option<String>,
    correct_answer: Option<String>,
    #[serde(default)]
    incorrect_answers: Vec<String>,
}

/// Client for the Open Trivia Database. Batches are all-or-nothing: either
/// every usable question of a response is returned, or an error.
pub struct OpenTriviaClient {
    http: reqwest::Client,
    categories_url: Url,
    questions_url: Url,
}

impl OpenTriviaClient {
    pub fn new() -> Self {
        let base = Url::parse(BASE_URL).expect("base url is well-formed");
        Self {
            http: reqwest::Client::builder()
                .user_agent(USER_AGENT)
                .build()
                .expect("default client configuration is valid"),
            categories_url: base
                .join("api_category.php")
                .expect("category path is well-formed"),
            questions_url: base.join("api.php").expect("api path is well-formed"),
        }
    }

    #[instrument(level = "info", skip(self))]
    pub async fn categories(&self) -> Result<Vec<TriviaCategory>, TriviaError> {
        let payload: CategoryResponse = self
            .http
            .get(self.categories_url.clone())
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;

        Ok(payload
            .trivia_categories
            .unwrap_or_default()
            .into_iter()
            .map(|c| TriviaCategory {
                id: c.id,
                name: html_escape::decode_html_entities(&c.name).into_owned(),
            })
            .collect())
    }

    #[instrument(level = "info", skip(self))]
    pub async fn import_questions(
        &self,
        amount: u8,
        category: u32,
        difficulty: Option<Difficulty>,
    ) -> Result<Vec<Question>, TriviaError> {
        if !(MIN_IMPORT_AMOUNT..=MAX_IMPORT_AMOUNT).contains(&amount) {
            return Err(TriviaError::InvalidAmount(amount));
        }

        let mut url = self.questions_url.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("amount", &amount.to_string())
                .append_pair("category", &category.to_string())
                .append_pair("type", "multiple");
            if let Some(difficulty) = difficulty {
                query.append_pair("difficulty", difficulty.as_query_param());
            }
        }

        let payload: QuestionsResponse = self
            .http
            .get(url)
            .send()
            .await
            .map_err(classify)?
            .error_for_status()
            .map_err(classify)?
            .json()
            .await
            .map_err(classify)?;

        if payload.response_code != 0 {
            return Err(TriviaError::Api(payload.response_code));
        }
        let results = payload.results.unwrap_or_default();
        if results.is_empty() {
            return Err(TriviaError::Empty);
        }

        let questions = questions_from_results(results);
        if questions.is_empty() {
            return Err(TriviaError::Unusable);
        }
        log::info!("Imported {} questions from Open Trivia Database", questions.len());
        Ok(questions)
    }
}

impl Default for OpenTriviaClient {
    fn default() -> Self {
        Self::new()
    }
}

fn questions_from_results(results: Vec<QuestionDto>) -> Vec<Question> {
    let mut rng = rand::thread_rng();
    let mut questions = Vec::new();

    for result in results {
        let text = decode(result.question);
        let correct = decode(result.correct_answer);
        if text.trim().is_empty() || correct.trim().is_empty() {
            continue;
        }

        let mut options = vec![AnswerOption::new(correct, true)];
        options.extend(
            result
                .incorrect_answers
                .into_iter()
                .map(|answer| {
                    AnswerOption::new(
                        html_escape::decode_html_entities(&answer).into_owned(),
                        false,
                    )
                }),
        );
        if options.len() < 2 {
            continue;
        }
        options.shuffle(&mut rng);

        questions.push(Question::new(text, options));
    }

    questions
}

fn decode(value: Option<String>) -> String {
    value
        .map(|v| html_escape::decode_html_entities(&v).into_owned())
        .unwrap_or_default()
}
