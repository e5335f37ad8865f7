//! Request Router Library
//! Department classification and request correlation for guest intake

mod classifier;
mod correlator;

pub use classifier::{classify, KeywordClassifier, RequestClassifier, KEYWORD_TABLE};
pub use correlator::new_request_id;
