use async_trait::async_trait;
use log::{debug, info};
use serde_json::json;

use crate::{config::KeystoneConfig, error::ApiError};

const SUBJECT_TOKEN_HEADER: &str = "X-Subject-Token";

/// Issues bearer tokens.
#[async_trait(?Send)]
pub trait TokenService {
	async fn issue_token(&self, keystone: &KeystoneConfig) -> Result<String, ApiError>;
}

/// Keystone v3 password authentication.
#[derive(Clone, Copy, Debug, Default)]
pub struct Keystone;

#[async_trait(?Send)]
impl TokenService for Keystone {
	async fn issue_token(&self, keystone: &KeystoneConfig) -> Result<String, ApiError> {
		let url = keystone.url.join("v3/auth/tokens")?;
		let creds = &keystone.credentials;
		let body = json!({
			"auth": {
				"identity": {
					"methods": ["password"],
					"password": {
						"user": {
							"name": creds.username,
							"domain": { "name": creds.domain },
							"password": creds.password,
						}
					}
				}
			}
		});

		debug!("keystone: POST {} user={}", url, creds.username);
		let mut res = surf::post(url).body(surf::Body::from_json(&body)?).await?;

		let status = res.status();
		if !status.is_success() {
			let body = res.body_string().await.unwrap_or_default();
			return Err(ApiError::Status {
				status: status.into(),
				body,
			});
		}

		let token = res
			.header(SUBJECT_TOKEN_HEADER)
			.map(|values| values.last().as_str().to_owned())
			.filter(|t| !t.is_empty())
			.ok_or_else(|| ApiError::Decode(format!("no {} header in response", SUBJECT_TOKEN_HEADER)))?;

		info!("keystone: issued token for {}", creds.username);
		Ok(token)
	}
}
