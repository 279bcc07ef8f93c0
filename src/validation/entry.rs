use crate::error::{AppError, Result};

/// Longest accepted entry title, in characters.
const TITLE_MAX_CHARS: usize = 200;

/// Longest accepted entry body, in characters.
const CONTENT_MAX_CHARS: usize = 10_000;

/// Validates an entry title.
///
/// # Arguments
///
/// * `title` - The title to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the title is valid.
pub fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation(
            "タイトルを入力してください".to_string(),
        ));
    }

    if title.chars().count() > TITLE_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "タイトルは{TITLE_MAX_CHARS}文字以内で入力してください"
        )));
    }

    Ok(())
}

/// Validates an entry body.
///
/// # Arguments
///
/// * `content` - The body text to validate.
///
/// # Returns
///
/// A `Result<()>` indicating whether the body is valid.
pub fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::Validation(
            "内容を入力してください".to_string(),
        ));
    }

    if content.chars().count() > CONTENT_MAX_CHARS {
        return Err(AppError::Validation(format!(
            "内容は{CONTENT_MAX_CHARS}文字以内で入力してください"
        )));
    }

    Ok(())
}
