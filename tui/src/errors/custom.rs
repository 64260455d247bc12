use thiserror::Error;

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("http {status}: {text}")]
    HttpStatusError { status: u16, text: String },

    #[error("invalid username or password")]
    InvalidCredentials,

    #[error("marketplace api error: {0}")]
    Api(String),

    #[error(transparent)]
    Serde(#[from] serde_json::Error),
}

/// Classify engine errors for user-facing onboarding messages. The engine
/// reports failed requests as `http <status>: <message>` strings.
pub fn classify(err: &anyhow::Error) -> ClientError {
    let text = format!("{err:#}");
    if text.contains("http 401") {
        return ClientError::InvalidCredentials;
    }
    if let Some(rest) = text.split("http ").nth(1) {
        if let Some((status, msg)) = rest.split_once(':') {
            if let Ok(status) = status.trim().parse::<u16>() {
                return ClientError::HttpStatusError {
                    status,
                    text: msg.trim().to_string(),
                };
            }
        }
    }
    ClientError::Api(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unauthorized_maps_to_invalid_credentials() {
        let err = anyhow::anyhow!("http 401: unauthorized");
        assert!(matches!(classify(&err), ClientError::InvalidCredentials));
    }

    #[test]
    fn other_statuses_keep_the_server_message() {
        let err = anyhow::anyhow!("http 409: username taken");
        match classify(&err) {
            ClientError::HttpStatusError { status, text } => {
                assert_eq!(status, 409);
                assert_eq!(text, "username taken");
            }
            other => panic!("unexpected {other:?}"),
        }
    }
}
