//! `CommunityStore` over a PostgREST endpoint (`<url>/rest/v1/<table>`),
//! authenticated with the service role key.

use async_trait::async_trait;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Method, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::store::{
    fork_attributes, unique_username, CommunityStore, NewPost, NewReply, NewStory, Post,
    ProfileRequest, Reply, StoreError, StoryRecord, StoryUpdate, UserProfile, Vote,
};
use crate::config::StoreConfig;

const POST_SELECT: &str = "*,users!posts_author_id_fkey(username,avatar)";
const POST_DETAIL_SELECT: &str = "*,users!posts_author_id_fkey(username,avatar),replies(count)";
const STORY_SELECT: &str = "*,users!stories_author_id_fkey(username,avatar)";
const SINGLE_OBJECT: &str = "application/vnd.pgrst.object+json";

pub struct RestStore {
    client: reqwest::Client,
    base_url: String,
    service_key: String,
}

#[derive(Serialize)]
struct NewAuthUser<'a> {
    email: &'a str,
    password: String,
    email_confirm: bool,
    user_metadata: AuthMetadata<'a>,
}

#[derive(Serialize)]
struct AuthMetadata<'a> {
    username: &'a str,
}

#[derive(Deserialize)]
struct AuthUser {
    id: String,
    #[serde(default)]
    email: Option<String>,
}

#[derive(Deserialize)]
struct AuthUserList {
    #[serde(default)]
    users: Vec<AuthUser>,
}

#[derive(Deserialize)]
struct EmojiRow {
    #[serde(default)]
    emoji: Option<String>,
}

impl RestStore {
    pub fn new(config: &StoreConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.url.clone(),
            service_key: config.service_key.clone(),
        }
    }

    fn headers(&self) -> Result<HeaderMap, StoreError> {
        let key = HeaderValue::from_str(&self.service_key)
            .map_err(|e| StoreError::Rejected(format!("invalid service key: {e}")))?;
        let bearer = HeaderValue::from_str(&format!("Bearer {}", self.service_key))
            .map_err(|e| StoreError::Rejected(format!("invalid service key: {e}")))?;
        let mut headers = HeaderMap::new();
        headers.insert("apikey", key);
        headers.insert(AUTHORIZATION, bearer);
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Ok(headers)
    }

    fn table(&self, method: Method, table: &str) -> Result<RequestBuilder, StoreError> {
        Ok(self
            .client
            .request(method, format!("{}/rest/v1/{table}", self.base_url))
            .headers(self.headers()?))
    }

    async fn send<T: DeserializeOwned>(&self, what: &str, req: RequestBuilder) -> Result<T, StoreError> {
        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        let response = check(what, response).await?;
        response
            .json::<T>()
            .await
            .map_err(|e| StoreError::Parse(e.to_string()))
    }

    /// Creates the auth-side user when possible; an existing user makes this
    /// fail, in which case the id is resolved by email instead.
    async fn resolve_auth_user(&self, request: &ProfileRequest) -> Result<String, StoreError> {
        if request.email.is_empty() {
            return request
                .id
                .clone()
                .ok_or_else(|| StoreError::Rejected("Unable to resolve auth user id".into()));
        }
        let body = NewAuthUser {
            email: &request.email,
            password: format!("{}Aa1!", uuid::Uuid::new_v4()),
            email_confirm: true,
            user_metadata: AuthMetadata {
                username: if request.username.is_empty() {
                    "AI User"
                } else {
                    &request.username
                },
            },
        };
        let created = self
            .client
            .post(format!("{}/auth/v1/admin/users", self.base_url))
            .headers(self.headers()?)
            .json(&body)
            .send()
            .await;
        if let Ok(resp) = created {
            if resp.status().is_success() {
                if let Ok(user) = resp.json::<AuthUser>().await {
                    return Ok(user.id);
                }
            } else {
                debug!(status = %resp.status(), "auth user not created, resolving existing");
            }
        }
        if let Some(id) = &request.id {
            return Ok(id.clone());
        }
        let list: AuthUserList = self
            .send(
                "auth users",
                self.client
                    .get(format!("{}/auth/v1/admin/users", self.base_url))
                    .headers(self.headers()?),
            )
            .await?;
        list.users
            .into_iter()
            .find(|u| {
                u.email
                    .as_deref()
                    .is_some_and(|e| e.eq_ignore_ascii_case(&request.email))
            })
            .map(|u| u.id)
            .ok_or_else(|| StoreError::Rejected("Unable to resolve auth user id".into()))
    }
}

async fn check(what: &str, response: Response) -> Result<Response, StoreError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let message = response.text().await.unwrap_or_default();
    // PostgREST answers 406 when a single-object request matched no rows.
    if status.as_u16() == 406 || status.as_u16() == 404 {
        return Err(StoreError::NotFound(what.to_string()));
    }
    Err(StoreError::Api {
        status: status.as_u16(),
        message,
    })
}

fn eq(value: &str) -> String {
    format!("eq.{value}")
}

fn ilike_any(columns: &[&str], query: &str) -> String {
    let needle = query.replace([',', '(', ')'], " ");
    let clauses: Vec<String> = columns
        .iter()
        .map(|c| format!("{c}.ilike.*{needle}*"))
        .collect();
    format!("({})", clauses.join(","))
}

fn single(req: RequestBuilder) -> RequestBuilder {
    req.header(ACCEPT, SINGLE_OBJECT)
}

fn returning(req: RequestBuilder) -> RequestBuilder {
    req.header("Prefer", "return=representation")
        .header(ACCEPT, SINGLE_OBJECT)
}

#[async_trait]
impl CommunityStore for RestStore {
    async fn ensure_user_profile(
        &self,
        request: &ProfileRequest,
    ) -> Result<UserProfile, StoreError> {
        let user_id = self.resolve_auth_user(request).await?;
        let existing = self
            .send::<UserProfile>(
                "user",
                single(
                    self.table(Method::GET, "users")?
                        .query(&[("select", "*".to_string()), ("id", eq(&user_id))]),
                ),
            )
            .await;
        match existing {
            Ok(user) => return Ok(user),
            Err(StoreError::NotFound(_)) => {}
            Err(e) => return Err(e),
        }

        let now = Utc::now().timestamp_millis().max(0) as u64;
        let row = serde_json::json!({
            "id": user_id,
            "username": unique_username(request, now),
            "email": request.email,
            "avatar": serde_json::Value::Null,
        });
        self.send(
            "user",
            returning(self.table(Method::POST, "users")?.json(&row)),
        )
        .await
    }

    async fn user_emoji(&self, user_id: &str) -> Result<Option<String>, StoreError> {
        let row: EmojiRow = self
            .send(
                "user",
                single(
                    self.table(Method::GET, "users")?
                        .query(&[("select", "emoji".to_string()), ("id", eq(user_id))]),
                ),
            )
            .await?;
        Ok(row.emoji)
    }

    async fn set_user_emoji(&self, user_id: &str, emoji: &str) -> Result<(), StoreError> {
        let req = self
            .table(Method::PATCH, "users")?
            .query(&[("id", eq(user_id))])
            .json(&serde_json::json!({ "emoji": emoji }));
        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check("user", response).await.map(|_| ())
    }

    async fn create_post(&self, post: NewPost) -> Result<Post, StoreError> {
        self.send(
            "post",
            returning(self.table(Method::POST, "posts")?.json(&post)),
        )
        .await
    }

    async fn list_posts(&self, limit: usize) -> Result<Vec<Post>, StoreError> {
        self.send(
            "posts",
            self.table(Method::GET, "posts")?.query(&[
                ("select", POST_SELECT.to_string()),
                ("deleted_at", "is.null".to_string()),
                ("order", "created_at.desc".to_string()),
                ("limit", limit.to_string()),
            ]),
        )
        .await
    }

    async fn get_post(&self, id: &str) -> Result<Post, StoreError> {
        self.send(
            &format!("post {id}"),
            single(self.table(Method::GET, "posts")?.query(&[
                ("select", POST_DETAIL_SELECT.to_string()),
                ("id", eq(id)),
                ("deleted_at", "is.null".to_string()),
            ])),
        )
        .await
    }

    async fn create_reply(&self, reply: NewReply) -> Result<Reply, StoreError> {
        self.send(
            "reply",
            returning(self.table(Method::POST, "replies")?.json(&reply)),
        )
        .await
    }

    async fn vote(&self, vote: Vote) -> Result<(), StoreError> {
        let req = self
            .table(Method::POST, "votes")?
            .header("Prefer", "resolution=merge-duplicates")
            .json(&vote);
        let response = req
            .send()
            .await
            .map_err(|e| StoreError::Network(e.to_string()))?;
        check("vote", response).await.map(|_| ())
    }

    async fn search_posts(&self, query: &str, limit: usize) -> Result<Vec<Post>, StoreError> {
        self.send(
            "posts",
            self.table(Method::GET, "posts")?.query(&[
                ("select", POST_SELECT.to_string()),
                ("deleted_at", "is.null".to_string()),
                ("or", ilike_any(&["title", "text"], query)),
                ("order", "upvotes.desc".to_string()),
                ("limit", limit.to_string()),
            ]),
        )
        .await
    }

    async fn delete_post(&self, id: &str, author_id: &str) -> Result<Post, StoreError> {
        let now = Utc::now().to_rfc3339();
        self.send(
            &format!("post {id}"),
            returning(
                self.table(Method::PATCH, "posts")?
                    .query(&[("id", eq(id)), ("author_id", eq(author_id))])
                    .json(&serde_json::json!({ "deleted_at": now, "updated_at": now })),
            ),
        )
        .await
    }

    async fn create_story(&self, story: NewStory) -> Result<StoryRecord, StoreError> {
        self.send(
            "story",
            returning(self.table(Method::POST, "stories")?.json(&story)),
        )
        .await
    }

    async fn list_stories(
        &self,
        limit: usize,
        public_only: bool,
    ) -> Result<Vec<StoryRecord>, StoreError> {
        let mut query = vec![
            ("select", STORY_SELECT.to_string()),
            ("order", "created_at.desc".to_string()),
            ("limit", limit.to_string()),
        ];
        if public_only {
            query.push(("is_public", "eq.true".to_string()));
        }
        self.send("stories", self.table(Method::GET, "stories")?.query(&query))
            .await
    }

    async fn story_by_slug(&self, slug: &str) -> Result<StoryRecord, StoreError> {
        self.send(
            &format!("story {slug}"),
            single(
                self.table(Method::GET, "stories")?
                    .query(&[("select", STORY_SELECT.to_string()), ("slug", eq(slug))]),
            ),
        )
        .await
    }

    async fn update_story(
        &self,
        id: &str,
        update: StoryUpdate,
    ) -> Result<StoryRecord, StoreError> {
        let body = serde_json::json!({
            "title": update.title,
            "description": update.description,
            "updated_at": Utc::now().to_rfc3339(),
        });
        self.send(
            &format!("story {id}"),
            returning(
                self.table(Method::PATCH, "stories")?
                    .query(&[("id", eq(id))])
                    .json(&body),
            ),
        )
        .await
    }

    async fn search_stories(
        &self,
        query: &str,
        limit: usize,
    ) -> Result<Vec<StoryRecord>, StoreError> {
        self.send(
            "stories",
            self.table(Method::GET, "stories")?.query(&[
                ("select", STORY_SELECT.to_string()),
                ("is_public", "eq.true".to_string()),
                ("or", ilike_any(&["title", "description"], query)),
                ("order", "play_count.desc".to_string()),
                ("limit", limit.to_string()),
            ]),
        )
        .await
    }

    async fn fork_story(
        &self,
        original_id: &str,
        fork: NewStory,
    ) -> Result<StoryRecord, StoreError> {
        let original: StoryRecord = self
            .send(
                &format!("story {original_id}"),
                single(
                    self.table(Method::GET, "stories")?
                        .query(&[("select", "*".to_string()), ("id", eq(original_id))]),
                ),
            )
            .await?;

        let mut body = serde_json::to_value(NewStory {
            tags: original.tags.clone(),
            ..fork
        })
        .map_err(|e| StoreError::Parse(e.to_string()))?;
        if let Some(map) = body.as_object_mut() {
            map.insert(
                "attributes".into(),
                fork_attributes(&original, &Utc::now().to_rfc3339()),
            );
        }
        let created: StoryRecord = self
            .send(
                "story",
                returning(self.table(Method::POST, "stories")?.json(&body)),
            )
            .await?;

        let bump = self
            .client
            .post(format!(
                "{}/rest/v1/rpc/increment_story_fork_count",
                self.base_url
            ))
            .headers(self.headers()?)
            .json(&serde_json::json!({ "story_id": original_id }))
            .send()
            .await;
        match bump {
            Ok(resp) if resp.status().is_success() => {}
            Ok(resp) => warn!(status = %resp.status(), story = %original_id, "fork count not incremented"),
            Err(e) => warn!(err = %e, story = %original_id, "fork count not incremented"),
        }
        Ok(created)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ilike_filter_strips_grouping_characters() {
        assert_eq!(
            ilike_any(&["title", "text"], "badger (tale), part"),
            "(title.ilike.*badger  tale   part*,text.ilike.*badger  tale   part*)"
        );
    }

    #[test]
    fn headers_carry_service_key() {
        let store = RestStore::new(&StoreConfig {
            url: "https://db.test".into(),
            service_key: "svc".into(),
        });
        let headers = store.headers().expect("headers");
        assert_eq!(headers.get("apikey").and_then(|v| v.to_str().ok()), Some("svc"));
        assert_eq!(
            headers.get(AUTHORIZATION).and_then(|v| v.to_str().ok()),
            Some("Bearer svc")
        );
    }
}
