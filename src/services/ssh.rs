//! SSH command execution against registered nodes

use std::sync::Arc;
use std::time::Duration;

use russh::client::{self, Handler};
use russh::keys::{decode_secret_key, PrivateKeyWithHashAlg};
use russh::ChannelMsg;

use crate::models::{SshAuthType, SshNode};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
const EXEC_TIMEOUT: Duration = Duration::from_secs(180);

struct AcceptAnyHostKey;

impl Handler for AcceptAnyHostKey {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        _server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        // Nodes are operator-registered; host keys are not pinned.
        Ok(true)
    }
}

/// Run one command on a node. Never errors: failures come back as
/// `(false, reason)` so callers can log and surface them uniformly.
/// Output is stdout plus stderr, lossily decoded; success means exit 0.
pub async fn exec_command(node: &SshNode, command: &str) -> (bool, String) {
    match tokio::time::timeout(EXEC_TIMEOUT, exec_inner(node, command)).await {
        Ok(result) => result,
        Err(_) => (false, "SSH command timed out after 180s".to_string()),
    }
}

async fn exec_inner(node: &SshNode, command: &str) -> (bool, String) {
    let Some(host) = node.ssh_host.as_deref() else {
        return (false, "SSH host is not configured".to_string());
    };
    let Some(username) = node.ssh_username.as_deref() else {
        return (false, "SSH username is not configured".to_string());
    };

    let config = Arc::new(client::Config::default());
    let connect = client::connect(config, (host, node.ssh_port), AcceptAnyHostKey);
    let mut handle = match tokio::time::timeout(CONNECT_TIMEOUT, connect).await {
        Ok(Ok(handle)) => handle,
        Ok(Err(err)) => return (false, format!("SSH connect failed: {err}")),
        Err(_) => return (false, "SSH connect timed out after 15s".to_string()),
    };

    let auth = match node.ssh_auth_type {
        SshAuthType::Password => {
            let Some(password) = node.ssh_password.as_deref() else {
                return (false, "SSH password is empty".to_string());
            };
            handle.authenticate_password(username, password).await
        }
        SshAuthType::PrivateKey => {
            let Some(pem) = node.ssh_private_key.as_deref() else {
                return (false, "Private key is empty".to_string());
            };
            let key = match decode_secret_key(pem, node.ssh_passphrase.as_deref()) {
                Ok(key) => key,
                Err(_) => return (false, "Unsupported private key format".to_string()),
            };
            let hash_alg = match handle.best_supported_rsa_hash().await {
                Ok(hash_alg) => hash_alg.flatten(),
                Err(err) => return (false, format!("SSH negotiation failed: {err}")),
            };
            handle
                .authenticate_publickey(
                    username,
                    PrivateKeyWithHashAlg::new(Arc::new(key), hash_alg),
                )
                .await
        }
    };

    match auth {
        Ok(result) if result.success() => {}
        Ok(_) => return (false, "SSH authentication rejected".to_string()),
        Err(err) => return (false, format!("SSH authentication failed: {err}")),
    }

    let mut channel = match handle.channel_open_session().await {
        Ok(channel) => channel,
        Err(err) => return (false, format!("SSH channel open failed: {err}")),
    };
    if let Err(err) = channel.exec(true, command).await {
        return (false, format!("SSH exec failed: {err}"));
    }

    let mut stdout: Vec<u8> = Vec::new();
    let mut stderr: Vec<u8> = Vec::new();
    let mut exit_code: Option<u32> = None;

    while let Some(msg) = channel.wait().await {
        match msg {
            ChannelMsg::Data { data } => stdout.extend_from_slice(&data),
            ChannelMsg::ExtendedData { data, ext: 1 } => stderr.extend_from_slice(&data),
            ChannelMsg::ExitStatus { exit_status } => exit_code = Some(exit_status),
            _ => {}
        }
    }

    let _ = handle
        .disconnect(russh::Disconnect::ByApplication, "", "en")
        .await;

    let out_text = String::from_utf8_lossy(&stdout);
    let err_text = String::from_utf8_lossy(&stderr);
    let mut output = if !out_text.is_empty() && !err_text.is_empty() {
        format!("{out_text}\n{err_text}")
    } else {
        format!("{out_text}{err_text}")
    };
    output = output.trim().to_string();
    if output.is_empty() {
        output = "(empty output)".to_string();
    }

    (exit_code == Some(0), output)
}
