//! Escalation notification boundary

use super::{CollabError, CollabResult};
use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{AsyncSmtpTransport, AsyncTransport, Message, Tokio1Executor};

#[async_trait]
pub trait EscalationNotifier: Send + Sync {
    /// Deliver an escalation notice. `Ok(true)` means the notice was
    /// accepted by the transport.
    async fn send_escalation(
        &self,
        recipient: &str,
        summary: &str,
        thread_link: &str,
        ticket_key: Option<&str>,
    ) -> CollabResult<bool>;
}

/// SMTP adapter for escalation email
pub struct SmtpNotifier {
    transport: AsyncSmtpTransport<Tokio1Executor>,
    from: Mailbox,
}

impl SmtpNotifier {
    pub fn new(
        host: &str,
        port: u16,
        username: Option<&str>,
        password: Option<&str>,
        from: &str,
    ) -> CollabResult<Self> {
        let mut builder = AsyncSmtpTransport::<Tokio1Executor>::starttls_relay(host)
            .map_err(|e| CollabError::Smtp(e.to_string()))?
            .port(port);

        if let (Some(username), Some(password)) = (username, password) {
            builder = builder.credentials(Credentials::new(
                username.to_string(),
                password.to_string(),
            ));
        }

        let from = from
            .parse::<Mailbox>()
            .map_err(|e| CollabError::Smtp(e.to_string()))?;

        Ok(Self {
            transport: builder.build(),
            from,
        })
    }

    fn body(summary: &str, thread_link: &str, ticket_key: Option<&str>) -> String {
        let mut body = format!(
            "Supportline - Escalation Notice\n\n\
             Summary:\n{summary}\n\n\
             This conversation has been escalated due to SLA breach or complexity.\n\n\
             Thread: {thread_link}\n"
        );
        if let Some(key) = ticket_key {
            body.push_str(&format!("\nTicket: {key}\n"));
        }
        body.push_str("\nPlease review and take appropriate action.\n");
        body
    }
}

#[async_trait]
impl EscalationNotifier for SmtpNotifier {
    async fn send_escalation(
        &self,
        recipient: &str,
        summary: &str,
        thread_link: &str,
        ticket_key: Option<&str>,
    ) -> CollabResult<bool> {
        let to = recipient
            .parse::<Mailbox>()
            .map_err(|e| CollabError::Smtp(e.to_string()))?;

        let email = Message::builder()
            .from(self.from.clone())
            .to(to)
            .subject("Escalation: support conversation needs attention")
            .body(Self::body(summary, thread_link, ticket_key))
            .map_err(|e| CollabError::Smtp(e.to_string()))?;

        self.transport
            .send(email)
            .await
            .map_err(|e| CollabError::Smtp(e.to_string()))?;

        tracing::info!(recipient = %recipient, "Escalation notice sent");
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn body_includes_ticket_when_present() {
        let with_ticket = SmtpNotifier::body("summary text", "https://chat/thread/1", Some("SUPPORT-7"));
        assert!(with_ticket.contains("summary text"));
        assert!(with_ticket.contains("SUPPORT-7"));

        let without = SmtpNotifier::body("summary text", "https://chat/thread/1", None);
        assert!(!without.contains("Ticket:"));
    }
}
