//! Welcome-mail collaborator.
//!
//! Mail delivery is best-effort: the signup response is already committed
//! when the send runs, so failures are logged and swallowed by the caller.

use anyhow::{Result, bail};
use async_trait::async_trait;
use tracing::info;

const RESEND_API_URL: &str = "https://api.resend.com/emails";

#[async_trait]
pub trait Mailer: Send + Sync {
    async fn send_welcome(&self, to: &str, name: &str, client_url: &str) -> Result<()>;
}

/// Delivers through the Resend HTTP API.
pub struct ResendMailer {
    client: reqwest::Client,
    api_key: String,
    from_email: String,
    from_name: String,
}

impl ResendMailer {
    pub fn new(api_key: String, from_email: String, from_name: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            from_email,
            from_name,
        }
    }
}

#[async_trait]
impl Mailer for ResendMailer {
    async fn send_welcome(&self, to: &str, name: &str, client_url: &str) -> Result<()> {
        let body = serde_json::json!({
            "from": format!("{} <{}>", self.from_name, self.from_email),
            "to": to,
            "subject": "Bem vindo ao Talkalot!",
            "html": welcome_email_html(name, client_url),
        });

        let response = self
            .client
            .post(RESEND_API_URL)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            bail!("mail provider returned {}", response.status());
        }

        info!("Welcome email sent to {}", to);
        Ok(())
    }
}

/// Used when no mail provider is configured.
pub struct NoopMailer;

#[async_trait]
impl Mailer for NoopMailer {
    async fn send_welcome(&self, to: &str, _name: &str, _client_url: &str) -> Result<()> {
        info!("Mail disabled, skipping welcome email to {}", to);
        Ok(())
    }
}

fn welcome_email_html(name: &str, client_url: &str) -> String {
    format!(
        r#"<html lang="pt-br"><body>
<h1>Bem-vindo ao Talkalot!</h1>
<p><strong>Olá {name},</strong></p>
<p>Estamos felizes em ter você no Talkalot! Conecte-se com amigos,
familiares e colegas em tempo real, não importa onde eles estejam.</p>
<p><a href="{client_url}">Abrir Talkalot</a></p>
<p>Se precisar de ajuda ou tiver dúvidas, estamos sempre aqui.</p>
</body></html>"#
    )
}
