pub mod html;
pub mod lemmatizer;
pub mod model;
pub mod persist;
pub mod store;

pub use model::{
    Lemma, LemmaId, Page, PageId, Posting, PostingId, Site, SiteId, SiteStatus,
};
pub use store::Store;
