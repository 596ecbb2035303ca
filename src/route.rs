//! Mode router.
//!
//! A pure function of the `is_image` flag set by ingestion, which is the
//! single source of truth for file kind; the router never re-derives it
//! from the path. The decision is a tagged variant consumed directly by the
//! orchestrator's dispatch, not a key written back into shared state.

/// Which answering strategy handles the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Retrieval-augmented answering over the semantic index.
    Document,
    /// Text extraction from the image, then answering.
    Image,
}

pub fn route(is_image: bool) -> Route {
    if is_image {
        Route::Image
    } else {
        Route::Document
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn image_flag_routes_to_image() {
        assert_eq!(route(true), Route::Image);
    }

    #[test]
    fn document_flag_routes_to_document() {
        assert_eq!(route(false), Route::Document);
    }
}
