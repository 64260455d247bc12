use std::{env, path::Path};

use anyhow::{anyhow, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64_STANDARD;
use base64::Engine;
use chacha20poly1305::{aead::Aead, ChaCha20Poly1305, Key, KeyInit as _, Nonce};
use rand_core::{OsRng, RngCore};
use serde_json::Value;
use sha2::{Digest, Sha256};
use tokio::fs;
use tracing::info;

const ENC_PREFIX: &str = "enc:";
const DEFAULT_SECRET: &str = "sello-local-01";

/// Load the monitor config. The stored bearer token is kept encrypted on
/// disk; a plaintext token found in the file is encrypted and written
/// back, while the returned runtime config always carries the plaintext.
pub async fn load_config(config_path: &Path) -> Result<Value> {
    let raw = fs::read(config_path)
        .await
        .with_context(|| format!("read config file: {}", config_path.display()))?;
    let mut disk_cfg: Value = serde_json::from_slice(&raw).context("parse config json")?;

    let (secret, secret_updated) = load_secret(&mut disk_cfg)?;
    let mut runtime_cfg = disk_cfg.clone();

    let token_updated =
        reconcile_token(&secret, &mut disk_cfg, &mut runtime_cfg).context("process token")?;

    if secret_updated || token_updated {
        write_config(config_path, &disk_cfg).await?;
        if token_updated {
            info!(
                "wrote encrypted session token back to config: {}",
                config_path.display()
            );
        } else {
            info!("persisted config secret default: {}", config_path.display());
        }
    }

    Ok(runtime_cfg)
}

fn load_secret(cfg: &mut Value) -> Result<(String, bool)> {
    if let Ok(secret) = env::var("SESSION_SECRET") {
        return Ok((secret, false));
    }

    let obj = cfg
        .as_object_mut()
        .ok_or_else(|| anyhow!("config root must be a JSON object"))?;

    match obj.get("config_secret") {
        Some(Value::String(secret)) => Ok((secret.clone(), false)),
        Some(_) => Err(anyhow!("config_secret must be a string")),
        None => {
            obj.insert(
                "config_secret".to_string(),
                Value::String(DEFAULT_SECRET.to_string()),
            );
            Ok((DEFAULT_SECRET.to_string(), true))
        }
    }
}

fn reconcile_token(secret: &str, disk_cfg: &mut Value, runtime_cfg: &mut Value) -> Result<bool> {
    let disk_session = match disk_cfg
        .get_mut("client_session")
        .and_then(Value::as_object_mut)
    {
        Some(section) => section,
        // nothing stored; the monitor will sign in with credentials
        None => return Ok(false),
    };
    let runtime_session = runtime_cfg
        .get_mut("client_session")
        .and_then(Value::as_object_mut)
        .ok_or_else(|| anyhow!("missing client_session section"))?;

    let token_value = disk_session
        .get("token")
        .and_then(Value::as_str)
        .ok_or_else(|| anyhow!("missing client_session.token"))?;

    if let Some(rest) = token_value.strip_prefix(ENC_PREFIX) {
        let plaintext = decrypt_token(secret, rest)?;
        runtime_session.insert("token".to_string(), Value::String(plaintext));
        Ok(false)
    } else {
        let plaintext = token_value.to_string();
        let encrypted = encrypt_token(secret, &plaintext)?;
        disk_session.insert(
            "token".to_string(),
            Value::String(format!("{}{}", ENC_PREFIX, encrypted)),
        );
        runtime_session.insert("token".to_string(), Value::String(plaintext));
        Ok(true)
    }
}

fn encrypt_token(secret: &str, plaintext: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let mut nonce_bytes = [0u8; 12];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);
    let mut ciphertext = cipher
        .encrypt(nonce, plaintext.as_bytes())
        .map_err(|err| anyhow!("encrypt token: {}", err))?;

    let mut combined = Vec::with_capacity(nonce_bytes.len() + ciphertext.len());
    combined.extend_from_slice(&nonce_bytes);
    combined.append(&mut ciphertext);

    Ok(BASE64_STANDARD.encode(combined))
}

fn decrypt_token(secret: &str, encoded: &str) -> Result<String> {
    let cipher = build_cipher(secret);
    let data = BASE64_STANDARD
        .decode(encoded.as_bytes())
        .map_err(|err| anyhow!("decode encrypted token: {}", err))?;
    if data.len() < 12 {
        return Err(anyhow!("encrypted token too short"));
    }
    let (nonce_bytes, ciphertext) = data.split_at(12);
    let nonce = Nonce::from_slice(nonce_bytes);
    let plaintext = cipher
        .decrypt(nonce, ciphertext)
        .map_err(|_| anyhow!("failed to decrypt token; check SESSION_SECRET"))?;
    String::from_utf8(plaintext).map_err(|err| anyhow!("decrypted token not utf-8: {}", err))
}

fn build_cipher(secret: &str) -> ChaCha20Poly1305 {
    let mut hasher = Sha256::new();
    hasher.update(secret.as_bytes());
    let digest = hasher.finalize();
    let key = Key::from_slice(&digest);
    ChaCha20Poly1305::new(key)
}

async fn write_config(path: &Path, value: &Value) -> Result<()> {
    let mut json = serde_json::to_vec_pretty(value).context("serialize config")?;
    json.push(b'\n');
    let tmp_path = temp_path(path);
    fs::write(&tmp_path, &json)
        .await
        .with_context(|| format!("write temp config: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("replace config: {}", path.display()))?;
    Ok(())
}

fn temp_path(path: &Path) -> std::path::PathBuf {
    let mut os_string = path.as_os_str().to_os_string();
    os_string.push(".tmp");
    os_string.into()
}
