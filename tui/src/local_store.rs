use std::{env, path::Path, path::PathBuf};

use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit, Nonce};
use eyre::{eyre, Context, Result};
use market_core::model::UserProfile;
use rand_core::{OsRng, RngCore};
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use tokio::fs;

const ENC_PREFIX: &str = "enc:";
const DEFAULT_SECRET: &str = "sello-local-01";

/// The two persisted pieces of client state: the bearer token and the
/// cached profile. They are stored under one key and cleared together on
/// logout or 401.
#[derive(Debug, Clone)]
pub struct StoredSession {
    pub token: String,
    pub profile: UserProfile,
    pub config_secret: String,
}

#[derive(Debug)]
pub struct PersistSession<'a> {
    pub token: &'a str,
    pub profile: &'a UserProfile,
    pub secret: Option<&'a str>,
}

pub fn session_path() -> PathBuf {
    env::var("SELLO_SESSION_FILE")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("session.json"))
}

pub async fn load_session() -> Result<Option<StoredSession>> {
    let path = session_path();
    if !path.exists() {
        return Ok(None);
    }

    let raw = fs::read(&path)
        .await
        .with_context(|| format!("read session file: {}", path.display()))?;
    let cfg: Value = serde_json::from_slice(&raw).context("parse session json")?;

    let secret = resolve_secret(&cfg);

    let client_session = match cfg.get("client_session").and_then(Value::as_object) {
        Some(section) => section,
        None => return Ok(None),
    };

    let token_value = client_session
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| eyre!("missing client_session.token"))?;

    let token = if let Some(rest) = token_value.strip_prefix(ENC_PREFIX) {
        decrypt_token(&secret, rest)?
    } else {
        token_value.to_string()
    };

    let profile_value = client_session
        .get("profile")
        .cloned()
        .ok_or_else(|| eyre!("missing client_session.profile"))?;
    let profile: UserProfile =
        serde_json::from_value(profile_value).context("parse stored profile")?;

    Ok(Some(StoredSession {
        token,
        profile,
        config_secret: secret,
    }))
}

pub async fn persist_session(data: &PersistSession<'_>) -> Result<()> {
    let path = session_path();
    let mut root: Value = if path.exists() {
        let raw = fs::read(&path)
            .await
            .with_context(|| format!("read session file: {}", path.display()))?;
        serde_json::from_slice(&raw).context("parse session json")?
    } else {
        json!({})
    };

    let secret = data
        .secret
        .map(|s| s.to_string())
        .or_else(|| {
            root.get("config_secret")
                .and_then(Value::as_str)
                .map(|s| s.to_string())
        })
        .unwrap_or_else(|| DEFAULT_SECRET.to_string());
    root["config_secret"] = Value::String(secret.clone());

    let enc_token = encrypt_token(&secret, data.token)?;
    root["client_session"] = json!({
        "token": format!("{}{}", ENC_PREFIX, enc_token),
        "profile": serde_json::to_value(data.profile).context("serialize profile")?,
    });

    write_atomic(&path, &root).await
}

/// Drop the persisted session: token and profile go together, the config
/// secret stays so a later login reuses it.
pub async fn clear_session() -> Result<()> {
    let path = session_path();
    if !path.exists() {
        return Ok(());
    }
    let raw = fs::read(&path)
        .await
        .with_context(|| format!("read session file: {}", path.display()))?;
    let mut root: Value = serde_json::from_slice(&raw).context("parse session json")?;
    if let Some(obj) = root.as_object_mut() {
        obj.remove("client_session");
    }
    write_atomic(&path, &root).await
}

async fn write_atomic(path: &Path, value: &Value) -> Result<()> {
    let mut json_bytes = serde_json::to_vec_pretty(value).context("serialize session")?;
    json_bytes.push(b'\n');
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, &json_bytes)
        .await
        .with_context(|| format!("write temp session: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, &path)
        .await
        .with_context(|| format!("replace session: {}", path.display()))?;
    Ok(())
}

fn resolve_secret(cfg: &Value) -> String {
    if let Ok(secret) = env::var("SESSION_SECRET") {
        return secret;
    }
    cfg.get("config_secret")
        .and_then(Value::as_str)
        .map(|s| s.to_string())
        .unwrap_or_else(|| DEFAULT_SECRET.to_string())
}

fn encrypt_token(secret: &str, plaintext: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|err| eyre!("encrypt token: {}", err))?;

    let mut combined = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.append(&mut ciphertext);

    Ok(BASE64_STANDARD.encode(combined))
}

fn decrypt_token(secret: &str, encoded: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let data = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|err| eyre!("decode encrypted token: {}", err))?;
    if data.len() < 12 {
        return Err(eyre!("encrypted token too short"));
    }
    let (nonce_bytes, ciphertext) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| eyre!("failed to decrypt token; check SESSION_SECRET"))?;
    String::from_utf8(plaintext).map_err(|err| eyre!("decrypted token not utf-8: {}", err))
}

fn build_cipher(secret: &str) -> ChaCha20Poly1305 {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let key = Key::from_slice(&digest);
    ChaCha20Poly1305::new(key)
}

fn temp_path(path: &Path) -> PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    os_string.into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use market_core::model::UserRole;

    #[tokio::test]
    async fn roundtrip_persists_encrypted_and_clears_both_pieces() {
        let file = std::env::temp_dir().join(format!(
            "sello-session-test-{}.json",
            std::process::id()
        ));
        env::set_var("SELLO_SESSION_FILE", &file);
        let _ = fs::remove_file(&file).await;

        let profile = UserProfile {
            id: "u1".to_string(),
            username: "alice".to_string(),
            role: UserRole::User,
            is_active: true,
        };
        persist_session(&PersistSession {
            token: "secret-token",
            profile: &profile,
            secret: None,
        })
        .await
        .unwrap();

        // token never hits disk in the clear
        let raw = fs::read_to_string(&file).await.unwrap();
        assert!(!raw.contains("secret-token"));
        assert!(raw.contains(ENC_PREFIX));

        let stored = load_session().await.unwrap().unwrap();
        assert_eq!(stored.token, "secret-token");
        assert_eq!(stored.profile, profile);

        clear_session().await.unwrap();
        assert!(load_session().await.unwrap().is_none());
        let raw = fs::read_to_string(&file).await.unwrap();
        assert!(raw.contains("config_secret"), "secret survives logout");

        let _ = fs::remove_file(&file).await;
        env::remove_var("SELLO_SESSION_FILE");
    }
}
