//! Composes the subject/body pair described by spec.md §6's sender
//! contract paragraph: subscription title, endpoint link, previous value
//! (if present), current value, optional hero image, and the content
//! digest rendered as "Fingerprint".

use diffwatch_core::domain::{Notifier, Snapshot, Subscription};

pub struct EmailBody {
    pub subject: String,
    pub html: String,
}

pub fn snapshot_email(
    subscription: &Subscription,
    previous: Option<&Snapshot>,
    current: &Snapshot,
) -> EmailBody {
    let title = if subscription.title.is_empty() {
        subscription.endpoint.as_str()
    } else {
        subscription.title.as_str()
    };

    let subject = format!("Diffwatch: \"{title}\" changed");

    let previous_block = match previous {
        Some(previous) => format!(
            "<p><strong>Previous value:</strong><br>{}</p>",
            html_escape(&previous.content)
        ),
        None => String::new(),
    };

    let image_block = if subscription.image_url.is_empty() {
        String::new()
    } else {
        format!(
            "<p><img src=\"{}\" alt=\"\" style=\"max-width:100%\"></p>",
            html_escape(&subscription.image_url)
        )
    };

    let html = format!(
        "<h1>{title}</h1>\
         <p><a href=\"{endpoint}\">{endpoint}</a></p>\
         {image_block}\
         {previous_block}\
         <p><strong>Current value:</strong><br>{current}</p>\
         <p style=\"color:#888\">Fingerprint: {digest}</p>",
        title = html_escape(title),
        endpoint = html_escape(&subscription.endpoint),
        image_block = image_block,
        previous_block = previous_block,
        current = html_escape(&current.content),
        digest = current.content_digest,
    );

    EmailBody { subject, html }
}

pub fn verification_email(notifier: &Notifier, verify_url: &str) -> EmailBody {
    EmailBody {
        subject: "Confirm your Diffwatch notifier".to_string(),
        html: format!(
            "<p>Confirm delivery to {} by visiting <a href=\"{url}\">{url}</a>.</p>",
            html_escape(&notifier.platform_identifier),
            url = html_escape(verify_url),
        ),
    }
}

fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn subscription() -> Subscription {
        Subscription {
            id: 1,
            user_id: 1,
            notifier_id: 1,
            endpoint: "https://example.com".to_string(),
            xpath: "//h1".to_string(),
            title: "Example Title".to_string(),
            image_url: String::new(),
            last_poll_time: None,
            no_content_since: None,
            deleted_at: None,
        }
    }

    fn snapshot(content: &str) -> Snapshot {
        Snapshot {
            id: 1,
            timestamp: Utc::now(),
            user_id: 1,
            subscription_id: 1,
            content: content.to_string(),
            content_digest: diffwatch_core::digest(content),
        }
    }

    #[test]
    fn includes_fingerprint_and_current_value() {
        let current = snapshot("Hello earth");
        let body = snapshot_email(&subscription(), None, &current);
        assert!(body.html.contains(&current.content_digest));
        assert!(body.html.contains("Hello earth"));
        assert!(!body.html.contains("Previous value"));
    }

    #[test]
    fn includes_previous_value_when_present() {
        let previous = snapshot("Hello world");
        let current = snapshot("Hello earth");
        let body = snapshot_email(&subscription(), Some(&previous), &current);
        assert!(body.html.contains("Previous value"));
        assert!(body.html.contains("Hello world"));
    }
}
