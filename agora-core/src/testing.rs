use crate::{
    memory::MemoryStore,
    social::{Social, SocialConfig},
    store::PostId,
};
use agora_common::model::account::Account;
use std::sync::Arc;

pub(crate) struct Fixture {
    pub store: Arc<MemoryStore>,
    pub social: Social,
}

impl Fixture {
    pub fn new() -> Self {
        Self::with_config(SocialConfig::default())
    }

    pub fn with_config(config: SocialConfig) -> Self {
        let store = Arc::new(MemoryStore::new());
        let social = Social::new(store.clone(), config);
        Self { store, social }
    }

    pub async fn account(&self, handle: &str, is_public: bool) -> Account {
        self.store.seed_account(handle, is_public).await.unwrap()
    }

    pub async fn post(&self, author: &Account, content: &str) -> PostId {
        self.social
            .create_post(author.id, content.to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id
    }

    pub async fn comment(&self, author: &Account, parent: PostId, content: &str) -> PostId {
        self.social
            .create_comment(author.id, parent, content.to_owned(), Vec::new())
            .await
            .unwrap()
            .post
            .id
    }
}
