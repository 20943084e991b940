use crate::{
    error::Result,
    store::{PostQuery, PostScope, Store},
    viewer::Viewer,
};
use agora_common::model::{
    page::{Page, PageRequest},
    post::{ActivityWeights, PostWithActivity},
};

/// Top-level posts the viewer may see, highest activity score first.
///
/// Counts and scores are computed on every call.
pub async fn feed(
    store: &dyn Store,
    viewer: Viewer,
    page: PageRequest,
    weights: ActivityWeights,
) -> Result<Page<PostWithActivity>> {
    list_posts(store, PostScope::Feed { viewer }, page, weights).await
}

/// One page of posts in `scope` together with the total page count.
pub async fn list_posts(
    store: &dyn Store,
    scope: PostScope,
    page: PageRequest,
    weights: ActivityWeights,
) -> Result<Page<PostWithActivity>> {
    let total = store.count_posts(scope).await?;
    let items = store
        .fetch_posts(&PostQuery {
            scope,
            page,
            weights,
        })
        .await?;
    Ok(Page::new(items, page, total))
}

#[cfg(test)]
mod tests {
    use crate::{testing::Fixture, viewer::Viewer};
    use agora_common::model::{page::PageRequest, post::ActivityCounts};

    #[tokio::test]
    async fn higher_score_ranks_first() {
        let fixture = Fixture::new();
        let a = fixture.account("account_a", true).await;
        let b = fixture.account("account_b", true).await;
        let fans = [
            fixture.account("fan_one", true).await,
            fixture.account("fan_two", true).await,
            fixture.account("fan_three", true).await,
        ];

        let post_a = fixture.post(&a, "three likes, one comment").await;
        let post_b = fixture.post(&b, "one like, two comments").await;

        for fan in &fans {
            fixture.social.like(fan.id, post_a).await.unwrap();
        }
        fixture.comment(&fans[0], post_a, "nice").await;
        fixture.social.like(fans[0].id, post_b).await.unwrap();
        fixture.comment(&fans[0], post_b, "first").await;
        fixture.comment(&fans[1], post_b, "second").await;

        let feed = fixture
            .social
            .feed(Viewer::Guest, PageRequest::default())
            .await
            .unwrap();
        assert_eq!(feed.items.len(), 2);
        assert_eq!(feed.items[0].post.id, post_a);
        assert_eq!(feed.items[1].post.id, post_b);

        assert_eq!(
            feed.items[0].activity,
            ActivityCounts {
                likes: 3,
                comments: 1,
                bookmarks: 0
            }
        );
        assert!((feed.items[0].score - 2.9).abs() < 1e-9);
        assert!((feed.items[1].score - 2.3).abs() < 1e-9);
        assert_eq!(feed.items[1].author.id, b.id);
    }

    #[tokio::test]
    async fn equal_scores_show_newest_first() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let older = fixture.post(&author, "older").await;
        let newer = fixture.post(&author, "newer").await;

        let feed = fixture
            .social
            .feed(Viewer::Guest, PageRequest::default())
            .await
            .unwrap();
        let order: Vec<_> = feed.items.iter().map(|item| item.post.id).collect();
        assert_eq!(order, [newer, older]);
    }

    #[tokio::test]
    async fn weighted_ties_show_newest_first() {
        let fixture = Fixture::new();
        let author = fixture.account("author", true).await;
        let mut fans = Vec::new();
        for fan in 0..8 {
            fans.push(fixture.account(&format!("fan_{fan}"), true).await);
        }

        let commented = fixture.post(&author, "seven comments").await;
        let liked = fixture.post(&author, "eight likes").await;
        for fan in &fans[..7] {
            fixture.comment(fan, commented, "reply").await;
        }
        for fan in &fans {
            fixture.social.like(fan.id, liked).await.unwrap();
        }

        let feed = fixture
            .social
            .feed(Viewer::Guest, PageRequest::default())
            .await
            .unwrap();
        let order: Vec<_> = feed.items.iter().map(|item| item.post.id).collect();
        assert_eq!(order, [liked, commented]);
        assert_eq!(feed.items[0].score, feed.items[1].score);
    }

    #[tokio::test]
    async fn feed_respects_visibility() {
        let fixture = Fixture::new();
        let public = fixture.account("public", true).await;
        let private = fixture.account("private", false).await;
        let follower = fixture.account("follower", true).await;
        let stranger = fixture.account("stranger", true).await;

        let public_post = fixture.post(&public, "for everyone").await;
        let private_post = fixture.post(&private, "for followers").await;
        fixture.comment(&public, public_post, "comments stay out of feeds").await;

        fixture
            .social
            .follow_request(follower.id, private.id)
            .await
            .unwrap();
        fixture
            .social
            .accept_follow_request(private.id, follower.id)
            .await
            .unwrap();

        let ids = |viewer: Viewer| {
            let social = fixture.social.clone();
            async move {
                let mut ids: Vec<_> = social
                    .feed(viewer, PageRequest::default())
                    .await
                    .unwrap()
                    .items
                    .into_iter()
                    .map(|item| item.post.id)
                    .collect();
                ids.sort();
                ids
            }
        };

        let mut both = vec![public_post, private_post];
        both.sort();
        assert_eq!(ids(Viewer::Guest).await, [public_post]);
        assert_eq!(ids(stranger.id.into()).await, [public_post]);
        assert_eq!(ids(follower.id.into()).await, both);
        assert_eq!(ids(private.id.into()).await, both);
    }

    #[tokio::test]
    async fn pages_are_exact() {
        let fixture = Fixture::new();
        let author = fixture.account("prolific", true).await;
        for n in 0..5 {
            fixture.post(&author, &format!("post {n}")).await;
        }

        let page = |n| PageRequest::new(n, 2).unwrap();
        let first = fixture.social.feed(Viewer::Guest, page(1)).await.unwrap();
        assert_eq!(first.total_pages, 3);
        assert_eq!(first.items.len(), 2);

        let last = fixture.social.feed(Viewer::Guest, page(3)).await.unwrap();
        assert_eq!(last.items.len(), 1);
        assert!(
            first
                .items
                .iter()
                .all(|item| item.post.id != last.items[0].post.id)
        );

        let beyond = fixture.social.feed(Viewer::Guest, page(4)).await.unwrap();
        assert!(beyond.items.is_empty());
        assert_eq!(beyond.total_pages, 3);

        let furthest = fixture
            .social
            .feed(Viewer::Guest, page(i64::MAX))
            .await
            .unwrap();
        assert!(furthest.items.is_empty());
    }
}
