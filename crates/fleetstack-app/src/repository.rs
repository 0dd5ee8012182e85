//! Git repository server client

use crate::error::{AppError, Result};
use serde::Serialize;
use tracing::debug;

#[derive(Debug, Serialize)]
struct NewRepository<'a> {
    name: &'a str,
    users: &'a [String],
    ispublic: bool,
}

/// Client for the repository server that hosts each app's git remote
#[derive(Debug, Clone)]
pub struct RepositoryClient {
    client: reqwest::Client,
    server: String,
}

impl RepositoryClient {
    pub fn new(server: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            server: server.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn server(&self) -> &str {
        &self.server
    }

    /// `POST /repository`
    pub async fn create(&self, name: &str, users: &[String], public: bool) -> Result<()> {
        let url = format!("{}/repository", self.server);
        debug!(url = %url, name, "creating repository");

        let response = self
            .client
            .post(&url)
            .json(&NewRepository {
                name,
                users,
                ispublic: public,
            })
            .send()
            .await?;
        check(response).await
    }

    /// `DELETE /repository/<name>`
    pub async fn delete(&self, name: &str) -> Result<()> {
        let url = format!("{}/repository/{}", self.server, name);
        debug!(url = %url, "removing repository");

        let response = self.client.delete(&url).send().await?;
        check(response).await
    }
}

async fn check(response: reqwest::Response) -> Result<()> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    let body = response.text().await.unwrap_or_default();
    Err(AppError::Repository {
        status: status.as_u16(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_string, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn test_create_posts_repository() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/repository"))
            .and(body_string(
                r#"{"name":"someapp","users":["sad-but-true@metallica.com"],"ispublic":false}"#,
            ))
            .respond_with(ResponseTemplate::new(200))
            .expect(1)
            .mount(&server)
            .await;

        RepositoryClient::new(server.uri())
            .create("someapp", &["sad-but-true@metallica.com".to_string()], false)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_delete_failure_is_remote_error() {
        let server = MockServer::start().await;
        Mock::given(method("DELETE"))
            .and(path("/repository/someapp"))
            .respond_with(ResponseTemplate::new(404).set_body_string("no such repository"))
            .expect(1)
            .mount(&server)
            .await;

        let err = RepositoryClient::new(format!("{}/", server.uri()))
            .delete("someapp")
            .await
            .unwrap_err();

        assert_eq!(err.kind(), fleetstack_core::ErrorKind::Remote);
        assert_eq!(err.to_string(), "Repository server returned 404: no such repository");
    }
}
