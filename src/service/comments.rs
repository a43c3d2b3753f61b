//! Input comment cleaning and statistics

use serde::Serialize;
use utoipa::ToSchema;

/// Comments that survived cleaning
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedComments {
    pub comments: Vec<String>,
    pub original_count: usize,
}

impl ValidatedComments {
    pub fn final_count(&self) -> usize {
        self.comments.len()
    }

    pub fn dropped(&self) -> usize {
        self.original_count - self.comments.len()
    }
}

/// Trim every comment and drop blank ones; `None` when nothing is left
pub fn validate_comments(raw: &[String]) -> Option<ValidatedComments> {
    let comments: Vec<String> = raw
        .iter()
        .map(|c| c.trim())
        .filter(|c| !c.is_empty())
        .map(str::to_string)
        .collect();

    if comments.is_empty() {
        return None;
    }

    Some(ValidatedComments {
        comments,
        original_count: raw.len(),
    })
}

/// Length statistics in characters
#[derive(Debug, Clone, Default, PartialEq, Serialize, ToSchema)]
pub struct CommentStats {
    pub count: usize,
    pub total_chars: usize,
    pub avg_length: f64,
    pub min_length: usize,
    pub max_length: usize,
}

impl CommentStats {
    pub fn of(comments: &[String]) -> Self {
        let lengths: Vec<usize> = comments.iter().map(|c| c.chars().count()).collect();
        let total_chars: usize = lengths.iter().sum();

        Self {
            count: comments.len(),
            total_chars,
            avg_length: if comments.is_empty() {
                0.0
            } else {
                total_chars as f64 / comments.len() as f64
            },
            min_length: lengths.iter().copied().min().unwrap_or(0),
            max_length: lengths.iter().copied().max().unwrap_or(0),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|v| v.to_string()).collect()
    }

    #[test]
    fn test_blank_comments_are_dropped() {
        let validated = validate_comments(&strings(&["  I love cats ", "", "\n\t", "Dogs"])).unwrap();

        assert_eq!(validated.comments, strings(&["I love cats", "Dogs"]));
        assert_eq!(validated.original_count, 4);
        assert_eq!(validated.dropped(), 2);
    }

    #[test]
    fn test_nothing_left() {
        assert!(validate_comments(&[]).is_none());
        assert!(validate_comments(&strings(&[" ", ""])).is_none());
    }

    #[test]
    fn test_stats() {
        let stats = CommentStats::of(&strings(&["abc", "abcdefg"]));

        assert_eq!(stats.count, 2);
        assert_eq!(stats.total_chars, 10);
        assert_eq!(stats.avg_length, 5.0);
        assert_eq!(stats.min_length, 3);
        assert_eq!(stats.max_length, 7);
        assert_eq!(CommentStats::of(&[]), CommentStats::default());
    }
}
