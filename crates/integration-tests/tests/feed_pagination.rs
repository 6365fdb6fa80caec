mod support;

use std::collections::HashSet;

use chrono::{Duration, Utc};
use domains::{
    FeedScope, Post, PostRepository, RankingView, SortDirection, TimeWindow, VoteTarget, VoteValue,
};
use support::{body_text, feed_query, filtered_query, search_query, World};
use uuid::Uuid;

#[tokio::test]
async fn third_page_of_twenty_five_holds_the_oldest_five() {
    let world = World::new();
    let owner = world.user().await;
    let books = world.community(&owner, "Books and Readers").await;
    for n in 0..25 {
        world.post(&owner, &books, &format!("Book number {n}")).await;
    }

    let query = feed_query(FeedScope::Community(books.community.id), RankingView::Newest, 10, 20);
    let page = world.services.feed.fetch_posts(owner.id, &query).await.unwrap();

    let titles: Vec<_> = page.items.iter().map(|s| s.post.title.as_str()).collect();
    assert_eq!(
        titles,
        ["Book number 4", "Book number 3", "Book number 2", "Book number 1", "Book number 0"]
    );
    assert_eq!(page.meta.total_count, 25);
    assert_eq!(page.meta.total_pages, 3);
    assert_eq!(page.meta.current_page, 3);
}

#[tokio::test]
async fn pages_partition_the_full_ordering() {
    let world = World::new();
    let owner = world.user().await;
    let club = world.community(&owner, "Partition Testers").await;
    for n in 0..13 {
        world.post(&owner, &club, &format!("Partition entry {n}")).await;
    }
    let scope = FeedScope::Community(club.community.id);
    let feed = &world.services.feed;

    let everything = feed
        .fetch_posts(owner.id, &feed_query(scope, RankingView::Newest, 20, 0))
        .await
        .unwrap();
    assert_eq!(everything.items.len(), 13);

    let mut walked = Vec::new();
    for offset in (0..13).step_by(4) {
        let page = feed
            .fetch_posts(owner.id, &feed_query(scope, RankingView::Newest, 4, offset))
            .await
            .unwrap();
        assert_eq!(page.meta.total_count, 13);
        walked.extend(page.items.into_iter().map(|s| s.post.id));
    }

    let expected: Vec<_> = everything.items.iter().map(|s| s.post.id).collect();
    assert_eq!(walked, expected);
    assert_eq!(walked.iter().collect::<HashSet<_>>().len(), 13);

    let beyond = feed
        .fetch_posts(owner.id, &feed_query(scope, RankingView::Newest, 4, 40))
        .await
        .unwrap();
    assert!(beyond.items.is_empty());
    assert_eq!(beyond.meta.total_count, 13);
}

#[tokio::test]
async fn top_view_ranks_by_score_then_recency() {
    let world = World::new();
    let owner = world.user().await;
    let voters = [world.user().await, world.user().await];
    let club = world.community(&owner, "Ranked Discussions").await;

    let quiet = world.post(&owner, &club, "Quiet opening post").await;
    let loved = world.post(&owner, &club, "Widely loved post").await;
    let disliked = world.post(&owner, &club, "Widely disliked post").await;
    let fresh = world.post(&owner, &club, "Fresh unvoted post").await;

    let votes = &world.services.votes;
    for voter in &voters {
        votes
            .cast_vote(voter.id, VoteTarget::Post(loved.post.id), VoteValue::UP)
            .await
            .unwrap();
        votes
            .cast_vote(voter.id, VoteTarget::Post(disliked.post.id), VoteValue::DOWN)
            .await
            .unwrap();
    }

    let query = feed_query(FeedScope::Community(club.community.id), RankingView::Top, 10, 0);
    let page = world.services.feed.fetch_posts(voters[0].id, &query).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|s| s.post.id).collect();
    assert_eq!(ids, [loved.post.id, fresh.post.id, quiet.post.id, disliked.post.id]);

    assert_eq!(page.items[0].stats.score, 2);
    assert_eq!(page.items[0].stats.viewer_vote, 1);
    assert_eq!(page.items[3].stats.viewer_vote, -1);

    let ascending = filtered_query(
        FeedScope::Community(club.community.id),
        TimeWindow::AllTime,
        RankingView::Top,
        SortDirection::Asc,
    );
    let page = world.services.feed.fetch_posts(voters[0].id, &ascending).await.unwrap();
    let ids: Vec<_> = page.items.iter().map(|s| s.post.id).collect();
    assert_eq!(ids, [disliked.post.id, quiet.post.id, fresh.post.id, loved.post.id]);
}

#[tokio::test]
async fn time_windows_drop_older_posts() {
    let world = World::new();
    let owner = world.user().await;
    let club = world.community(&owner, "Seasonal Reading").await;
    let recent = world.post(&owner, &club, "Posted just now").await;

    let archived = Post {
        id: Uuid::now_v7(),
        title: "Posted ten days ago".to_string(),
        content: body_text(),
        slug: "posted-ten-days-ago".to_string(),
        tags: Vec::new(),
        community_id: club.community.id,
        author_id: owner.id,
        created_at: Utc::now() - Duration::days(10),
    };
    PostRepository::create(&*world.store, &archived).await.unwrap();

    let feed = &world.services.feed;
    let scope = FeedScope::Community(club.community.id);
    let titles = |window: TimeWindow, shift: Duration| {
        let query = filtered_query(scope, window, RankingView::Newest, SortDirection::Desc);
        async move {
            let page = feed
                .fetch_posts_at(owner.id, &query, Utc::now() + shift)
                .await
                .unwrap();
            assert_eq!(page.meta.total_count, page.items.len() as u64);
            page.items
                .into_iter()
                .map(|s| s.post.title)
                .collect::<Vec<_>>()
        }
    };

    assert_eq!(titles(TimeWindow::Today, Duration::zero()).await, [recent.post.title.clone()]);
    assert_eq!(titles(TimeWindow::Week, Duration::zero()).await, [recent.post.title.clone()]);
    assert_eq!(
        titles(TimeWindow::Month, Duration::zero()).await,
        [recent.post.title.clone(), archived.title.clone()]
    );

    // Two days on, nothing is from today but the recent post is still this week's.
    assert!(titles(TimeWindow::Today, Duration::days(2)).await.is_empty());
    assert_eq!(titles(TimeWindow::Week, Duration::days(2)).await, [recent.post.title.clone()]);
    assert_eq!(titles(TimeWindow::AllTime, Duration::days(2)).await.len(), 2);
}

#[tokio::test]
async fn joined_scope_covers_only_the_viewers_communities() {
    let world = World::new();
    let owner = world.user().await;
    let reader = world.user().await;
    let gardening = world.community(&owner, "Gardening Circle").await;
    let chess = world.community(&owner, "Chess Openings Club").await;

    world.post(&owner, &gardening, "Tomatoes in containers").await;
    world.post(&owner, &chess, "The Sicilian, revisited").await;

    let query = feed_query(FeedScope::Joined, RankingView::Newest, 10, 0);
    let before = world.services.feed.fetch_posts(reader.id, &query).await.unwrap();
    assert!(before.items.is_empty());

    world.join(&reader, &gardening.community.slug).await;
    let after = world.services.feed.fetch_posts(reader.id, &query).await.unwrap();
    let titles: Vec<_> = after.items.iter().map(|s| s.post.title.as_str()).collect();
    assert_eq!(titles, ["Tomatoes in containers"]);

    // The creator is a member of both.
    let owners = world.services.feed.fetch_posts(owner.id, &query).await.unwrap();
    assert_eq!(owners.meta.total_count, 2);
}

#[tokio::test]
async fn search_matches_title_or_body_ignoring_case() {
    let world = World::new();
    let owner = world.user().await;
    let club = world.community(&owner, "Programming Languages").await;

    let filler = "Meetup recap with slides, links and the questions we ran out of time for. ".repeat(2);
    world.post_with(&owner, &club, "Why I moved to RUST", filler.clone()).await;
    let body = format!("{filler} Ownership in rust made it click for me.");
    world.post_with(&owner, &club, "Notes from the meetup", body).await;
    world.post_with(&owner, &club, "Gardening is relaxing", filler).await;

    let page = world
        .services
        .feed
        .fetch_posts(owner.id, &search_query(FeedScope::Global, "Rust"))
        .await
        .unwrap();
    let mut titles: Vec<_> = page.items.iter().map(|s| s.post.title.clone()).collect();
    titles.sort();
    assert_eq!(titles, ["Notes from the meetup", "Why I moved to RUST"]);
}
