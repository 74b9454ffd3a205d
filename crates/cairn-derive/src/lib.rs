mod analytics;
mod documents;

pub use analytics::*;
pub use documents::*;

#[cfg(test)]
pub(crate) mod test_support {
    use cairn_core::{ThoughtMetadata, ThoughtRecord};

    pub fn rec(agent: &str, confidence: f64, quality: f64, complexity: f64) -> ThoughtRecord {
        ThoughtRecord::new(
            agent,
            format!("{agent} thinks at {confidence}"),
            confidence,
            ThoughtMetadata::new(quality, complexity),
        )
        .unwrap()
    }
}
