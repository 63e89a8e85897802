//! State transitions
//!
//! `reduce` is the only place a `ViewState` changes. It performs no I/O and
//! accepts every event in every view; combinations that make no sense leave
//! the state as it was.

use super::view::{View, ViewState};
use crate::models::{Post, User, UserProfile};

/// Notice shown when an opened post turns out to be deleted
pub const POST_VANISHED_NOTICE: &str = "This post no longer exists.";

/// Navigation requests
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Navigation {
    AllPosts,
    MyPosts,
    Back,
    StartCreate,
    StartEdit(Post),
    OpenProfile,
}

/// Inputs to the reducer: user intents already resolved against the backend,
/// and backend notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    /// Sign-in state reported by the identity provider
    IdentityChanged(Option<User>),
    FeedLoaded(Vec<Post>),
    FeedFailed(String),
    ProfileLoaded {
        user_id: String,
        profile: UserProfile,
    },
    UserPostsLoaded {
        user_id: String,
        posts: Vec<Post>,
    },
    Navigated(Navigation),
    PostOpened(Post),
    /// Fresh copy of a post already on screen
    PostRefreshed(Post),
    PostVanished {
        post_id: String,
    },
    PostCreated(Post),
    PostUpdated {
        post_id: String,
    },
    PostDeleted {
        post_id: String,
    },
    ProfileSaved(UserProfile),
    DisplayNameChanged(User),
    RetryRequested,
    Failed(String),
    NoticeDismissed,
}

/// Apply `event` to `state`
pub fn reduce(mut state: ViewState, event: Event) -> ViewState {
    match event {
        Event::IdentityChanged(user) => {
            let previous = state.user_id().map(str::to_string);
            let next = user.as_ref().map(|u| u.id.clone());
            if previous != next {
                state.profile = UserProfile::default();
                state.user_posts.clear();
            }
            let signed_out = previous.is_some() && next.is_none();
            let switched = previous.is_some() && next.is_some() && previous != next;
            state.user = user;
            state.auth_resolved = true;

            if signed_out {
                state.list_view = View::AllPosts;
                state.return_view = None;
                if !state.view.is_blocking() {
                    state.view = View::AllPosts;
                }
            } else if switched {
                // Edit and profile views belong to the previous user
                state.return_view = None;
                if matches!(
                    state.view,
                    View::EditPost { .. } | View::ProfileEdit | View::CreatePost
                ) {
                    state.view = state.list_view.clone();
                }
            }
            settle(state)
        }

        Event::FeedLoaded(posts) => {
            state.posts = posts;
            state.feed_loaded = true;
            settle(state)
        }

        Event::FeedFailed(message) => {
            if state.feed_loaded {
                state.notice = Some(message);
            } else {
                state.view = View::Error { message };
            }
            state
        }

        Event::ProfileLoaded { user_id, profile } => {
            if state.user_id() == Some(user_id.as_str()) {
                state.profile = profile;
            }
            state
        }

        Event::UserPostsLoaded { user_id, posts } => {
            if state.user_id() == Some(user_id.as_str()) {
                state.user_posts = posts;
            }
            state
        }

        Event::Navigated(navigation) => {
            if state.view.is_blocking() {
                return state;
            }
            state.notice = None;
            navigate(state, navigation)
        }

        Event::PostOpened(post) => {
            if state.view.is_blocking() {
                return state;
            }
            replace_known(&mut state, &post);
            state.view = View::PostDetail { post };
            state
        }

        Event::PostRefreshed(post) => {
            replace_known(&mut state, &post);
            if let View::PostDetail { post: shown } = &mut state.view {
                if shown.id == post.id {
                    *shown = post;
                }
            }
            state
        }

        Event::PostVanished { post_id } => {
            forget(&mut state, &post_id);
            if !state.view.is_blocking() {
                state.view = state.list_view.clone();
            }
            state.notice = Some(POST_VANISHED_NOTICE.to_string());
            state
        }

        Event::PostCreated(post) => {
            if !state.posts.iter().any(|p| p.id == post.id) {
                if state.user_id() == Some(post.author.id.as_str()) {
                    state.user_posts.insert(0, post.clone());
                }
                state.posts.insert(0, post);
            }
            if state.view == View::CreatePost {
                state.view = state.list_view.clone();
            }
            state.notice = None;
            state
        }

        Event::PostUpdated { post_id } => {
            if state.view.post().is_some_and(|p| p.id == post_id) {
                state.view = state.list_view.clone();
            }
            state.notice = None;
            state
        }

        Event::PostDeleted { post_id } => {
            forget(&mut state, &post_id);
            if state.view.post().is_some_and(|p| p.id == post_id) {
                state.view = state.list_view.clone();
            }
            state.notice = None;
            state
        }

        Event::ProfileSaved(profile) => {
            state.profile = profile;
            if state.view == View::ProfileEdit {
                state.view = state
                    .return_view
                    .take()
                    .unwrap_or_else(|| state.list_view.clone());
            }
            state.notice = None;
            state
        }

        Event::DisplayNameChanged(user) => {
            if state.user_id() == Some(user.id.as_str()) {
                state.profile.display_name = Some(user.display_name.clone());
                state.user = Some(user);
            }
            state
        }

        Event::RetryRequested => {
            if matches!(state.view, View::Error { .. }) {
                state.view = View::Loading;
                state.feed_loaded = false;
                state.notice = None;
            }
            state
        }

        Event::Failed(message) => {
            state.notice = Some(message);
            state
        }

        Event::NoticeDismissed => {
            state.notice = None;
            state
        }
    }
}

/// Leave `Loading` once identity and the global feed are both known
fn settle(mut state: ViewState) -> ViewState {
    if state.view == View::Loading && state.auth_resolved && state.feed_loaded {
        state.view = View::AllPosts;
        state.list_view = View::AllPosts;
    }
    state
}

fn navigate(mut state: ViewState, navigation: Navigation) -> ViewState {
    let signed_in = state.user.is_some();
    match navigation {
        Navigation::AllPosts => {
            state.view = View::AllPosts;
            state.list_view = View::AllPosts;
        }
        Navigation::MyPosts => {
            let target = if signed_in {
                View::MyPosts
            } else {
                View::AllPosts
            };
            state.view = target.clone();
            state.list_view = target;
        }
        Navigation::Back => match state.view {
            View::PostDetail { .. } | View::CreatePost | View::EditPost { .. } => {
                state.view = state.list_view.clone();
            }
            View::ProfileEdit => {
                state.view = state
                    .return_view
                    .take()
                    .unwrap_or_else(|| state.list_view.clone());
            }
            _ => {}
        },
        Navigation::StartCreate => {
            if signed_in {
                state.view = View::CreatePost;
            }
        }
        Navigation::StartEdit(post) => {
            if state.user_id().is_some_and(|id| post.is_authored_by(id)) {
                state.view = View::EditPost { post };
            }
        }
        Navigation::OpenProfile => {
            if signed_in && state.view != View::ProfileEdit {
                state.return_view = Some(state.view.clone());
                state.view = View::ProfileEdit;
            }
        }
    }
    state
}

fn replace_known(state: &mut ViewState, post: &Post) {
    for list in [&mut state.posts, &mut state.user_posts] {
        if let Some(known) = list.iter_mut().find(|p| p.id == post.id) {
            *known = post.clone();
        }
    }
}

fn forget(state: &mut ViewState, post_id: &str) {
    state.posts.retain(|p| p.id != post_id);
    state.user_posts.retain(|p| p.id != post_id);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use chrono::Utc;

    fn user(id: &str, name: &str) -> User {
        User {
            id: id.to_string(),
            display_name: name.to_string(),
            avatar_url: None,
            email: format!("{}@example.com", id),
        }
    }

    fn post(id: &str, author: &str) -> Post {
        Post {
            id: id.to_string(),
            title: "Hello".to_string(),
            content: "World".to_string(),
            header_image: String::new(),
            author: Author {
                id: author.to_string(),
                name: "Alice".to_string(),
            },
            created_at: Utc::now(),
            updated_at: Utc::now(),
            views: 0,
        }
    }

    fn ready(user: Option<User>, posts: Vec<Post>) -> ViewState {
        let state = reduce(ViewState::default(), Event::IdentityChanged(user));
        reduce(state, Event::FeedLoaded(posts))
    }

    #[test]
    fn test_loading_waits_for_identity_and_feed() {
        let state = reduce(ViewState::default(), Event::FeedLoaded(vec![]));
        assert_eq!(state.view, View::Loading);

        let state = reduce(state, Event::IdentityChanged(None));
        assert_eq!(state.view, View::AllPosts);
    }

    #[test]
    fn test_initial_feed_failure_is_fatal_until_retry() {
        let state = reduce(ViewState::default(), Event::IdentityChanged(None));
        let state = reduce(state, Event::FeedFailed("offline".to_string()));
        assert_eq!(
            state.view,
            View::Error {
                message: "offline".to_string()
            }
        );

        let state = reduce(state, Event::Navigated(Navigation::AllPosts));
        assert!(matches!(state.view, View::Error { .. }));

        let state = reduce(state, Event::RetryRequested);
        assert_eq!(state.view, View::Loading);
        let state = reduce(state, Event::FeedLoaded(vec![post("p1", "u1")]));
        assert_eq!(state.view, View::AllPosts);
    }

    #[test]
    fn test_later_feed_failure_only_sets_notice() {
        let state = ready(None, vec![post("p1", "u1")]);
        let state = reduce(state, Event::FeedFailed("offline".to_string()));
        assert_eq!(state.view, View::AllPosts);
        assert_eq!(state.notice.as_deref(), Some("offline"));
        assert_eq!(state.posts.len(), 1);
    }

    #[test]
    fn test_sign_out_clears_user_data_and_forces_all_posts() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(
            state,
            Event::UserPostsLoaded {
                user_id: "u1".to_string(),
                posts: vec![post("p1", "u1")],
            },
        );
        let state = reduce(state, Event::Navigated(Navigation::OpenProfile));
        assert_eq!(state.view, View::ProfileEdit);

        let state = reduce(state, Event::IdentityChanged(None));
        assert_eq!(state.view, View::AllPosts);
        assert!(state.user.is_none());
        assert!(state.user_posts.is_empty());
        assert_eq!(state.profile, UserProfile::default());
        assert!(state.return_view.is_none());
    }

    #[test]
    fn test_switching_user_leaves_edit_and_profile_views() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::Navigated(Navigation::MyPosts));
        let state = reduce(state, Event::Navigated(Navigation::StartEdit(post("p1", "u1"))));
        assert!(matches!(state.view, View::EditPost { .. }));

        let state = reduce(state, Event::IdentityChanged(Some(user("u2", "Bob"))));
        assert_eq!(state.view, View::MyPosts);
        assert_eq!(state.user_id(), Some("u2"));

        let state = reduce(state, Event::Navigated(Navigation::OpenProfile));
        assert_eq!(state.view, View::ProfileEdit);
        let state = reduce(state, Event::IdentityChanged(Some(user("u1", "Alice"))));
        assert_eq!(state.view, View::MyPosts);
        assert!(state.return_view.is_none());
    }

    #[test]
    fn test_same_user_keeps_the_edit_view() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::Navigated(Navigation::StartEdit(post("p1", "u1"))));
        let state = reduce(state, Event::IdentityChanged(Some(user("u1", "Alicia"))));
        assert!(matches!(state.view, View::EditPost { .. }));
    }

    #[test]
    fn test_stale_user_results_are_discarded() {
        let state = ready(Some(user("u2", "Bob")), vec![]);
        let state = reduce(
            state,
            Event::UserPostsLoaded {
                user_id: "u1".to_string(),
                posts: vec![post("p1", "u1")],
            },
        );
        let state = reduce(
            state,
            Event::ProfileLoaded {
                user_id: "u1".to_string(),
                profile: UserProfile {
                    about_me: "not mine".to_string(),
                    ..UserProfile::default()
                },
            },
        );
        assert!(state.user_posts.is_empty());
        assert_eq!(state.profile.about_me, "");
    }

    #[test]
    fn test_my_posts_requires_user() {
        let state = ready(None, vec![]);
        let state = reduce(state, Event::Navigated(Navigation::MyPosts));
        assert_eq!(state.view, View::AllPosts);

        let state = ready(Some(user("u1", "Alice")), vec![]);
        let state = reduce(state, Event::Navigated(Navigation::MyPosts));
        assert_eq!(state.view, View::MyPosts);
        assert_eq!(state.list_view, View::MyPosts);
    }

    #[test]
    fn test_back_returns_to_last_list_view() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::Navigated(Navigation::MyPosts));
        let state = reduce(state, Event::PostOpened(post("p1", "u1")));
        let state = reduce(state, Event::Navigated(Navigation::Back));
        assert_eq!(state.view, View::MyPosts);
    }

    #[test]
    fn test_profile_edit_returns_to_previous_view() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::PostOpened(post("p1", "u1")));
        let state = reduce(state, Event::Navigated(Navigation::OpenProfile));
        let state = reduce(state, Event::ProfileSaved(UserProfile::default()));
        assert!(matches!(state.view, View::PostDetail { .. }));
    }

    #[test]
    fn test_edit_is_author_only() {
        let state = ready(Some(user("u2", "Bob")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::Navigated(Navigation::StartEdit(post("p1", "u1"))));
        assert_eq!(state.view, View::AllPosts);
    }

    #[test]
    fn test_deleting_open_post_returns_to_list() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u1")]);
        let state = reduce(state, Event::Navigated(Navigation::StartEdit(post("p1", "u1"))));
        let state = reduce(
            state,
            Event::PostDeleted {
                post_id: "p1".to_string(),
            },
        );
        assert_eq!(state.view, View::AllPosts);
        assert!(state.posts.is_empty());
    }

    #[test]
    fn test_vanished_post_goes_to_list_with_notice() {
        let state = ready(None, vec![post("p1", "u1")]);
        let state = reduce(
            state,
            Event::PostVanished {
                post_id: "p1".to_string(),
            },
        );
        assert_eq!(state.view, View::AllPosts);
        assert_eq!(state.notice.as_deref(), Some(POST_VANISHED_NOTICE));
        assert!(state.posts.is_empty());
    }

    #[test]
    fn test_created_post_lands_at_head() {
        let state = ready(Some(user("u1", "Alice")), vec![post("p1", "u2")]);
        let state = reduce(state, Event::Navigated(Navigation::StartCreate));
        let state = reduce(state, Event::PostCreated(post("p2", "u1")));
        assert_eq!(state.view, View::AllPosts);
        assert_eq!(state.posts[0].id, "p2");
        assert_eq!(state.user_posts[0].id, "p2");
    }

    #[test]
    fn test_rename_updates_user_and_profile_name() {
        let state = ready(Some(user("u1", "Alice")), vec![]);
        let state = reduce(state, Event::DisplayNameChanged(user("u1", "Alicia")));
        assert_eq!(state.user.unwrap().display_name, "Alicia");
        assert_eq!(state.profile.display_name.as_deref(), Some("Alicia"));
    }
}
