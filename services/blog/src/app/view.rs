//! View model exposed to clients

use serde::Serialize;

use crate::models::{Post, User, UserProfile};

/// Named UI mode; exactly one is active per session
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum View {
    #[default]
    Loading,
    Error {
        message: String,
    },
    AllPosts,
    MyPosts,
    PostDetail {
        post: Post,
    },
    CreatePost,
    EditPost {
        post: Post,
    },
    ProfileEdit,
}

impl View {
    pub fn name(&self) -> &'static str {
        match self {
            View::Loading => "loading",
            View::Error { .. } => "error",
            View::AllPosts => "all_posts",
            View::MyPosts => "my_posts",
            View::PostDetail { .. } => "post_detail",
            View::CreatePost => "create_post",
            View::EditPost { .. } => "edit_post",
            View::ProfileEdit => "profile_edit",
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, View::AllPosts | View::MyPosts)
    }

    /// Loading and error screens accept no navigation
    pub fn is_blocking(&self) -> bool {
        matches!(self, View::Loading | View::Error { .. })
    }

    /// The post this view is showing or editing
    pub fn post(&self) -> Option<&Post> {
        match self {
            View::PostDetail { post } | View::EditPost { post } => Some(post),
            _ => None,
        }
    }
}

/// Everything a client needs to render one session
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ViewState {
    pub view: View,
    /// List view that detail, create and edit screens return to
    pub list_view: View,
    /// View to restore when leaving profile editing
    pub return_view: Option<View>,
    pub user: Option<User>,
    pub profile: UserProfile,
    pub posts: Vec<Post>,
    pub user_posts: Vec<Post>,
    pub notice: Option<String>,
    pub auth_resolved: bool,
    pub feed_loaded: bool,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            view: View::Loading,
            list_view: View::AllPosts,
            return_view: None,
            user: None,
            profile: UserProfile::default(),
            posts: Vec::new(),
            user_posts: Vec::new(),
            notice: None,
            auth_resolved: false,
            feed_loaded: false,
        }
    }
}

impl ViewState {
    pub fn user_id(&self) -> Option<&str> {
        self.user.as_ref().map(|u| u.id.as_str())
    }

    /// Posts shown by the active list view
    pub fn visible_posts(&self) -> &[Post] {
        match self.list_view {
            View::MyPosts => &self.user_posts,
            _ => &self.posts,
        }
    }

    /// Whether the active list has nothing to show
    pub fn is_feed_empty(&self) -> bool {
        self.visible_posts().is_empty()
    }

    /// Last copy of a post this session has seen
    pub fn find_known_post(&self, post_id: &str) -> Option<&Post> {
        self.view
            .post()
            .filter(|p| p.id == post_id)
            .or_else(|| self.posts.iter().find(|p| p.id == post_id))
            .or_else(|| self.user_posts.iter().find(|p| p.id == post_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Author;
    use chrono::Utc;

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

    #[test]
    fn test_visible_posts_follow_list_view() {
        let mut state = ViewState {
            posts: vec![post("p1", "u1"), post("p2", "u2")],
            user_posts: vec![post("p1", "u1")],
            ..ViewState::default()
        };
        assert_eq!(state.visible_posts().len(), 2);

        state.list_view = View::MyPosts;
        assert_eq!(state.visible_posts().len(), 1);

        state.user_posts.clear();
        assert!(state.is_feed_empty());
    }

    #[test]
    fn test_view_serializes_with_kind_tag() {
        let json = serde_json::to_value(View::Error {
            message: "boom".to_string(),
        })
        .unwrap();
        assert_eq!(json["kind"], "error");
        assert_eq!(json["message"], "boom");
    }
}
