//! Effect shell around the reducer
//!
//! The shell runs backend calls, bounds each one with the session's request
//! timeout and feeds their outcome to [`reduce`]. User actions and identity
//! notifications go through the same state lock, in whatever order they
//! arrive.

use serde::Deserialize;
use std::{
    future::Future,
    sync::{Arc, OnceLock},
    time::Duration,
};
use tokio::{
    sync::{Mutex, MutexGuard},
    task::AbortHandle,
};
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{AppError, AppResult, Event, Navigation, View, ViewState, reduce};
use crate::{
    blob::BlobStore,
    identity::{Credential, IdentityProvider},
    models::{ImageUpload, Post, PostData, PostDraft, ProfileData, User, UserProfile},
    propagation::DisplayNamePropagator,
    repositories::BlogRepository,
    validation::{sanitize_file_name, validate_content, validate_header_image_url, validate_title},
};

/// Requests a client can make of its session
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Action {
    SignIn { credential: Credential },
    SignOut,
    ShowAllPosts,
    ShowMyPosts,
    OpenPost { post_id: String },
    Back,
    StartCreate,
    StartEdit { post_id: String },
    OpenProfile,
    CreatePost { draft: PostDraft },
    UpdatePost { post_id: String, draft: PostDraft },
    DeletePost { post_id: String },
    UpdateProfile { about_me: String },
    UpdateDisplayName { display_name: String },
    DismissNotice,
    Retry,
}

impl Action {
    pub fn name(&self) -> &'static str {
        match self {
            Action::SignIn { .. } => "sign_in",
            Action::SignOut => "sign_out",
            Action::ShowAllPosts => "show_all_posts",
            Action::ShowMyPosts => "show_my_posts",
            Action::OpenPost { .. } => "open_post",
            Action::Back => "back",
            Action::StartCreate => "start_create",
            Action::StartEdit { .. } => "start_edit",
            Action::OpenProfile => "open_profile",
            Action::CreatePost { .. } => "create_post",
            Action::UpdatePost { .. } => "update_post",
            Action::DeletePost { .. } => "delete_post",
            Action::UpdateProfile { .. } => "update_profile",
            Action::UpdateDisplayName { .. } => "update_display_name",
            Action::DismissNotice => "dismiss_notice",
            Action::Retry => "retry",
        }
    }
}

/// Adapters a session talks to
#[derive(Clone)]
pub struct Backend {
    pub identity: Arc<dyn IdentityProvider>,
    pub repository: Arc<dyn BlogRepository>,
    pub blob: Arc<dyn BlobStore>,
}

/// Session tuning
#[derive(Debug, Clone)]
pub struct AppOptions {
    /// Upper bound for every backend call
    pub request_timeout: Duration,
}

impl Default for AppOptions {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// One client session
pub struct App {
    backend: Backend,
    options: AppOptions,
    propagator: DisplayNamePropagator,
    state: Mutex<ViewState>,
    mutation: Mutex<()>,
    listener: OnceLock<AbortHandle>,
}

impl App {
    /// Resolve identity and load the global feed, then follow identity changes.
    ///
    /// The returned session is in `AllPosts`, or in `Error` when the feed could
    /// not be loaded.
    pub async fn start(backend: Backend, options: AppOptions) -> Arc<Self> {
        let propagator = DisplayNamePropagator::new(
            backend.identity.clone(),
            backend.repository.clone(),
            options.request_timeout,
        );
        let mut subscription = backend.identity.subscribe();
        drop(subscription.borrow_and_update());

        let app = Arc::new(Self {
            backend,
            options,
            propagator,
            state: Mutex::new(ViewState::default()),
            mutation: Mutex::new(()),
            listener: OnceLock::new(),
        });

        info!("Starting session");
        let initial = app.backend.identity.current_user();
        let _ = tokio::join!(app.apply_identity(initial, false), app.reload_feed());

        let weak = Arc::downgrade(&app);
        let handle = tokio::spawn(async move {
            while subscription.changed().await.is_ok() {
                let user = subscription.borrow_and_update().clone();
                let Some(app) = weak.upgrade() else { break };
                app.apply_identity(user, false).await;
            }
            info!("Identity subscription closed");
        });
        let _ = app.listener.set(handle.abort_handle());

        app
    }

    /// Stop following identity changes
    pub fn shutdown(&self) {
        if let Some(listener) = self.listener.get() {
            listener.abort();
            info!("Session shut down");
        }
    }

    pub async fn snapshot(&self) -> ViewState {
        self.state.lock().await.clone()
    }

    /// Run `action` and return the resulting state
    pub async fn dispatch(&self, action: Action) -> AppResult<ViewState> {
        info!("Dispatching action: {}", action.name());

        match action {
            Action::SignIn { credential } => self.sign_in(&credential).await?,
            Action::SignOut => self.sign_out().await?,
            Action::ShowAllPosts => self.apply(Event::Navigated(Navigation::AllPosts)).await,
            Action::ShowMyPosts => self.show_my_posts().await,
            Action::OpenPost { post_id } => self.open_post(&post_id).await?,
            Action::Back => self.apply(Event::Navigated(Navigation::Back)).await,
            Action::StartCreate => self.start_create().await?,
            Action::StartEdit { post_id } => self.start_edit(&post_id).await?,
            Action::OpenProfile => self.open_profile().await?,
            Action::CreatePost { draft } => self.create_post(draft).await?,
            Action::UpdatePost { post_id, draft } => self.update_post(&post_id, draft).await?,
            Action::DeletePost { post_id } => self.delete_post(&post_id).await?,
            Action::UpdateProfile { about_me } => self.update_profile(about_me).await?,
            Action::UpdateDisplayName { display_name } => {
                self.update_display_name(&display_name).await?
            }
            Action::DismissNotice => self.apply(Event::NoticeDismissed).await,
            Action::Retry => self.retry().await,
        }

        Ok(self.snapshot().await)
    }

    /// Upload a header image for a post of the signed-in user and return its URL
    pub async fn upload_header_image(&self, upload: ImageUpload) -> AppResult<String> {
        let result = async {
            let user = self.require_user().await?;
            self.store_image(&user.id, &upload).await
        }
        .await;

        match result {
            Ok(url) => Ok(url),
            Err(e) => Err(self.fail("upload image", e).await),
        }
    }

    fn transition(state: &mut ViewState, event: Event) {
        let before = state.view.name();
        *state = reduce(std::mem::take(state), event);
        let after = state.view.name();
        if before != after {
            info!("View changed: {} -> {}", before, after);
        }
    }

    async fn apply(&self, event: Event) {
        let mut state = self.state.lock().await;
        Self::transition(&mut state, event);
    }

    async fn call<T, E>(&self, fut: impl Future<Output = Result<T, E>>) -> AppResult<T>
    where
        AppError: From<E>,
    {
        match tokio::time::timeout(self.options.request_timeout, fut).await {
            Ok(result) => result.map_err(AppError::from),
            Err(_) => Err(AppError::Timeout),
        }
    }

    fn begin_mutation(&self) -> AppResult<MutexGuard<'_, ()>> {
        self.mutation.try_lock().map_err(|_| {
            warn!("Rejected a change while another is in flight");
            AppError::Busy
        })
    }

    /// Record a user-visible failure and hand the error back
    async fn fail(&self, context: &str, err: AppError) -> AppError {
        error!("Failed to {}: {}", context, err);
        self.apply(Event::Failed(format!("Failed to {}: {}", context, err)))
            .await;
        err
    }

    async fn current_user(&self) -> Option<User> {
        self.state.lock().await.user.clone()
    }

    async fn require_user(&self) -> AppResult<User> {
        self.current_user().await.ok_or(AppError::NotSignedIn)
    }

    /// Signed-in user as the identity provider currently knows them.
    ///
    /// A rename that failed after its identity step leaves the session's copy
    /// with the old name; writes must carry the provider's name instead.
    async fn require_author(&self) -> AppResult<User> {
        let user = self.require_user().await?;
        match self.backend.identity.current_user() {
            Some(current) if current.id == user.id => Ok(current),
            _ => Ok(user),
        }
    }

    fn ensure_author(user: &User, post: &Post, verb: &str) -> AppResult<()> {
        if post.is_authored_by(&user.id) {
            Ok(())
        } else {
            Err(AppError::NotPermitted(format!(
                "You can only {} your own posts",
                verb
            )))
        }
    }

    /// Known copy of a post, or a fresh one from the store
    async fn find_post(&self, post_id: &str) -> AppResult<Post> {
        let known = self.state.lock().await.find_known_post(post_id).cloned();
        if let Some(post) = known {
            return Ok(post);
        }
        self.call(self.backend.repository.get_post(post_id))
            .await?
            .ok_or_else(|| AppError::PostNotFound(post_id.to_string()))
    }

    /// Apply a sign-in state and load the user's data when the user changed.
    ///
    /// `always_load` reloads even when the user was already applied, so a
    /// sign-in action returns with the user's data in place.
    async fn apply_identity(&self, user: Option<User>, always_load: bool) {
        let changed = {
            let mut state = self.state.lock().await;
            let changed = !state.auth_resolved
                || state.user_id() != user.as_ref().map(|u| u.id.as_str());
            if changed {
                info!(
                    "Identity changed: {}",
                    user.as_ref().map(|u| u.id.as_str()).unwrap_or("signed out")
                );
                Self::transition(&mut state, Event::IdentityChanged(user.clone()));
            }
            changed
        };

        if let Some(user) = user {
            if changed || always_load {
                self.load_user_data(&user.id).await;
            }
        }
    }

    async fn load_user_data(&self, user_id: &str) {
        tokio::join!(self.reload_profile(user_id), self.reload_user_posts(user_id));
    }

    async fn reload_profile(&self, user_id: &str) {
        let profile = match tokio::time::timeout(
            self.options.request_timeout,
            self.backend.repository.get_profile(user_id),
        )
        .await
        {
            Ok(profile) => profile,
            Err(_) => {
                warn!("Timed out loading profile for user {}", user_id);
                UserProfile::default()
            }
        };
        self.apply(Event::ProfileLoaded {
            user_id: user_id.to_string(),
            profile,
        })
        .await;
    }

    async fn reload_user_posts(&self, user_id: &str) {
        match self
            .call(self.backend.repository.list_user_posts(user_id))
            .await
        {
            Ok(posts) => {
                self.apply(Event::UserPostsLoaded {
                    user_id: user_id.to_string(),
                    posts,
                })
                .await
            }
            Err(e) => warn!("Error loading posts of user {}: {}", user_id, e),
        }
    }

    async fn reload_feed(&self) -> AppResult<()> {
        match self.call(self.backend.repository.list_all_posts()).await {
            Ok(posts) => {
                info!("Loaded {} posts", posts.len());
                self.apply(Event::FeedLoaded(posts)).await;
                Ok(())
            }
            Err(e) => {
                error!("Error loading posts: {}", e);
                self.apply(Event::FeedFailed(format!("Failed to load posts: {}", e)))
                    .await;
                Err(e)
            }
        }
    }

    /// Reload the global feed and the signed-in user's feed.
    ///
    /// Every write targets the user's own posts, so their feed is always stale
    /// afterwards, whether or not `MyPosts` is on screen.
    async fn refresh_feeds(&self) {
        let user_id = self.current_user().await.map(|u| u.id);
        let user_feed = async {
            if let Some(user_id) = &user_id {
                self.reload_user_posts(user_id).await;
            }
        };
        let _ = tokio::join!(self.reload_feed(), user_feed);
    }

    async fn refresh_open_post(&self, user_id: &str) {
        let open = {
            let state = self.state.lock().await;
            match &state.view {
                View::PostDetail { post } if post.is_authored_by(user_id) => Some(post.id.clone()),
                _ => None,
            }
        };
        let Some(post_id) = open else { return };

        match self.call(self.backend.repository.get_post(&post_id)).await {
            Ok(Some(post)) => self.apply(Event::PostRefreshed(post)).await,
            Ok(None) => self.apply(Event::PostVanished { post_id }).await,
            Err(e) => warn!("Error refreshing post {}: {}", post_id, e),
        }
    }

    async fn store_image(&self, user_id: &str, upload: &ImageUpload) -> AppResult<String> {
        let path = format!(
            "posts/{}/{}-{}",
            user_id,
            Uuid::new_v4(),
            sanitize_file_name(&upload.file_name)
        );
        let url = self.call(self.backend.blob.upload(upload, &path)).await?;
        info!("Uploaded header image to {}", path);
        Ok(url)
    }

    /// Validate a draft and resolve its header image
    async fn prepare(&self, user: &User, draft: PostDraft) -> AppResult<PostData> {
        validate_title(&draft.title).map_err(AppError::Invalid)?;
        validate_content(&draft.content).map_err(AppError::Invalid)?;

        let mut header_image_url = draft
            .header_image_url
            .clone()
            .filter(|url| !url.trim().is_empty());
        if let Some(url) = &header_image_url {
            validate_header_image_url(url).map_err(AppError::Invalid)?;
        }
        if let Some(upload) = &draft.header_image {
            header_image_url = Some(self.store_image(&user.id, upload).await?);
        }

        Ok(draft.into_data(header_image_url))
    }

    async fn sign_in(&self, credential: &Credential) -> AppResult<()> {
        let _gate = self.begin_mutation()?;

        match self.call(self.backend.identity.sign_in(credential)).await {
            Ok(user) => {
                info!("Signed in as {}", user.id);
                self.apply_identity(Some(user), true).await;
                Ok(())
            }
            Err(e) => {
                error!("Error signing in: {}", e);
                let message = match &e {
                    AppError::Identity(err) => err.user_message(),
                    other => format!("Failed to sign in. Error: {}", other),
                };
                self.apply(Event::Failed(message)).await;
                Err(e)
            }
        }
    }

    async fn sign_out(&self) -> AppResult<()> {
        match self.call(self.backend.identity.sign_out()).await {
            Ok(()) => {
                self.apply_identity(None, false).await;
                Ok(())
            }
            Err(e) => Err(self.fail("sign out", e).await),
        }
    }

    async fn show_my_posts(&self) {
        self.apply(Event::Navigated(Navigation::MyPosts)).await;
        if let Some(user) = self.current_user().await {
            self.reload_user_posts(&user.id).await;
        }
    }

    /// Count a view, then show the freshest copy available
    async fn open_post(&self, post_id: &str) -> AppResult<()> {
        let (blocked, known) = {
            let state = self.state.lock().await;
            (
                state.view.is_blocking(),
                state.find_known_post(post_id).cloned(),
            )
        };
        if blocked {
            info!("Ignoring open of post {} while the feed is not ready", post_id);
            return Ok(());
        }

        if let Err(e) = self
            .call(self.backend.repository.increment_views(post_id))
            .await
        {
            warn!("Error incrementing views for post {}: {}", post_id, e);
        }

        match self.call(self.backend.repository.get_post(post_id)).await {
            Ok(Some(post)) => self.apply(Event::PostOpened(post)).await,
            Ok(None) => {
                warn!("Post {} no longer exists", post_id);
                self.apply(Event::PostVanished {
                    post_id: post_id.to_string(),
                })
                .await
            }
            Err(e) => match known {
                Some(post) => {
                    warn!("Error loading post {}, showing known copy: {}", post_id, e);
                    self.apply(Event::PostOpened(post)).await
                }
                None => return Err(self.fail("load post", e).await),
            },
        }
        Ok(())
    }

    async fn start_create(&self) -> AppResult<()> {
        if self.current_user().await.is_none() {
            return Err(self.fail("create post", AppError::NotSignedIn).await);
        }
        self.apply(Event::Navigated(Navigation::StartCreate)).await;
        Ok(())
    }

    async fn start_edit(&self, post_id: &str) -> AppResult<()> {
        let result = async {
            let user = self.require_user().await?;
            let post = self.find_post(post_id).await?;
            Self::ensure_author(&user, &post, "edit")?;
            Ok::<_, AppError>(post)
        }
        .await;

        match result {
            Ok(post) => {
                self.apply(Event::Navigated(Navigation::StartEdit(post)))
                    .await;
                Ok(())
            }
            Err(e) => Err(self.fail("edit post", e).await),
        }
    }

    async fn open_profile(&self) -> AppResult<()> {
        let Some(user) = self.current_user().await else {
            return Err(self.fail("open profile", AppError::NotSignedIn).await);
        };
        self.apply(Event::Navigated(Navigation::OpenProfile)).await;
        self.reload_profile(&user.id).await;
        Ok(())
    }

    async fn create_post(&self, draft: PostDraft) -> AppResult<()> {
        let _gate = self.begin_mutation()?;

        let result = async {
            let user = self.require_author().await?;
            let data = self.prepare(&user, draft).await?;
            self.call(self.backend.repository.create_post(
                &data,
                &user.id,
                &user.display_name,
            ))
            .await
        }
        .await;

        match result {
            Ok(post) => {
                info!("Created post {}", post.id);
                self.apply(Event::PostCreated(post)).await;
                self.refresh_feeds().await;
                Ok(())
            }
            Err(e) => Err(self.fail("create post", e).await),
        }
    }

    async fn update_post(&self, post_id: &str, draft: PostDraft) -> AppResult<()> {
        let _gate = self.begin_mutation()?;

        let result = async {
            let user = self.require_user().await?;
            let post = self.find_post(post_id).await?;
            Self::ensure_author(&user, &post, "edit")?;
            let data = self.prepare(&user, draft).await?;
            self.call(self.backend.repository.update_post(post_id, &data))
                .await
        }
        .await;

        match result {
            Ok(()) => {
                info!("Updated post {}", post_id);
                self.apply(Event::PostUpdated {
                    post_id: post_id.to_string(),
                })
                .await;
                self.refresh_feeds().await;
                Ok(())
            }
            Err(e) => Err(self.fail("update post", e).await),
        }
    }

    async fn delete_post(&self, post_id: &str) -> AppResult<()> {
        let _gate = self.begin_mutation()?;

        let result = async {
            let user = self.require_user().await?;
            match self.find_post(post_id).await {
                Ok(post) => Self::ensure_author(&user, &post, "delete")?,
                Err(AppError::PostNotFound(_)) => {}
                Err(e) => return Err(e),
            }
            self.call(self.backend.repository.delete_post(post_id))
                .await
        }
        .await;

        match result {
            Ok(()) => {
                info!("Deleted post {}", post_id);
                self.apply(Event::PostDeleted {
                    post_id: post_id.to_string(),
                })
                .await;
                self.refresh_feeds().await;
                Ok(())
            }
            Err(e) => Err(self.fail("delete post", e).await),
        }
    }

    async fn update_profile(&self, about_me: String) -> AppResult<()> {
        let _gate = self.begin_mutation()?;

        let result = async {
            let user = self.require_author().await?;
            let data = ProfileData {
                about_me: Some(about_me),
            };
            self.call(self.backend.repository.upsert_profile(
                &user.id,
                &data,
                &user.display_name,
                user.avatar_url.as_deref(),
            ))
            .await?;
            Ok::<_, AppError>(user)
        }
        .await;

        match result {
            Ok(user) => {
                info!("Updated profile of user {}", user.id);
                let profile = self.backend.repository.get_profile(&user.id);
                let profile = tokio::time::timeout(self.options.request_timeout, profile)
                    .await
                    .unwrap_or_default();
                self.apply(Event::ProfileSaved(profile)).await;
                Ok(())
            }
            Err(e) => Err(self.fail("update profile", e).await),
        }
    }

    /// Rename the signed-in user; failures leave the session untouched
    async fn update_display_name(&self, display_name: &str) -> AppResult<()> {
        let _gate = self.begin_mutation()?;
        let user = self.require_user().await?;

        let report = self.propagator.propagate(&user.id, display_name).await?;
        self.apply(Event::DisplayNameChanged(report.user)).await;

        tokio::join!(
            self.refresh_feeds(),
            self.reload_profile(&user.id),
            self.refresh_open_post(&user.id)
        );
        Ok(())
    }

    async fn retry(&self) {
        self.apply(Event::RetryRequested).await;
        let loading = self.state.lock().await.view == View::Loading;
        if loading {
            let _ = self.reload_feed().await;
        }
    }
}

impl Drop for App {
    fn drop(&mut self) {
        if let Some(listener) = self.listener.get() {
            listener.abort();
        }
    }
}
