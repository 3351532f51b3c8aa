pub mod keyword;
pub mod vector;

pub use keyword::InMemoryKeywordIndex;
pub use vector::InMemoryVectorIndex;

use crate::error::SearchError;

fn poisoned<T>(_: std::sync::PoisonError<T>) -> SearchError {
    SearchError::Retrieval("index lock poisoned".to_string())
}
