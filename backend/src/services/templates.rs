//! Invitation email templates

use chrono::{DateTime, Utc};

use crate::models::BusinessRole;

/// Subject and bodies of a rendered email
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
    pub text: String,
}

/// Values interpolated into an invitation email
#[derive(Debug, Clone)]
pub struct InvitationEmail<'a> {
    pub platform_name: &'a str,
    pub business_name: &'a str,
    /// Display name of the business type; admin invitations only
    pub business_type: Option<&'a str>,
    pub invitee_name: Option<&'a str>,
    pub role: BusinessRole,
    pub acceptance_link: &'a str,
    pub expires_at: DateTime<Utc>,
}

pub fn escape_html(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' => escaped.push_str("&quot;"),
            '\'' => escaped.push_str("&#39;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

fn format_expiry(expires_at: DateTime<Utc>) -> String {
    expires_at.format("%B %-d, %Y").to_string()
}

fn greeting(invitee_name: Option<&str>) -> String {
    match invitee_name {
        Some(name) if !name.trim().is_empty() => format!("Hello {},", name.trim()),
        _ => "Hello,".to_string(),
    }
}

/// Sent to the first administrator of a newly created business
pub fn admin_invitation(email: &InvitationEmail<'_>) -> RenderedEmail {
    let subject = format!(
        "You're invited to manage {} on {}",
        email.business_name, email.platform_name
    );
    let expiry = format_expiry(email.expires_at);
    let type_line = email
        .business_type
        .map(|t| format!(" ({})", t))
        .unwrap_or_default();

    let html = format!(
        "<p>{greeting}</p>\
         <p>{business}{business_type} has been registered on {platform}, and you have been \
         invited as its administrator.</p>\
         <p><a href=\"{link}\">Accept invitation</a></p>\
         <p>This invitation expires on {expiry}.</p>",
        greeting = escape_html(&greeting(email.invitee_name)),
        business = escape_html(email.business_name),
        business_type = escape_html(&type_line),
        platform = escape_html(email.platform_name),
        link = escape_html(email.acceptance_link),
        expiry = expiry,
    );

    let text = format!(
        "{greeting}\n\n{business}{business_type} has been registered on {platform}, and you have \
         been invited as its administrator.\n\nAccept the invitation: {link}\n\nThis invitation \
         expires on {expiry}.\n",
        greeting = greeting(email.invitee_name),
        business = email.business_name,
        business_type = type_line,
        platform = email.platform_name,
        link = email.acceptance_link,
        expiry = expiry,
    );

    RenderedEmail {
        subject,
        html,
        text,
    }
}

/// Sent when an existing business invites someone to join it
pub fn team_invitation(email: &InvitationEmail<'_>) -> RenderedEmail {
    let subject = format!("You're invited to join {}", email.business_name);
    let expiry = format_expiry(email.expires_at);

    let html = format!(
        "<p>{greeting}</p>\
         <p>You have been invited to join {business} on {platform} as a {role}.</p>\
         <p><a href=\"{link}\">Accept invitation</a></p>\
         <p>This invitation expires on {expiry}.</p>",
        greeting = escape_html(&greeting(email.invitee_name)),
        business = escape_html(email.business_name),
        platform = escape_html(email.platform_name),
        role = email.role.label(),
        link = escape_html(email.acceptance_link),
        expiry = expiry,
    );

    let text = format!(
        "{greeting}\n\nYou have been invited to join {business} on {platform} as a {role}.\n\n\
         Accept the invitation: {link}\n\nThis invitation expires on {expiry}.\n",
        greeting = greeting(email.invitee_name),
        business = email.business_name,
        platform = email.platform_name,
        role = email.role.label(),
        link = email.acceptance_link,
        expiry = expiry,
    );

    RenderedEmail {
        subject,
        html,
        text,
    }
}

/// Admin invitations get the onboarding template, everyone else the team one
pub fn render_invitation(email: &InvitationEmail<'_>) -> RenderedEmail {
    match email.role {
        BusinessRole::Admin => admin_invitation(email),
        BusinessRole::TeamMember => team_invitation(email),
    }
}
