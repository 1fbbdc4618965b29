use chrono::{Datelike, Utc};
use url::Url;

use super::EmailMessage;

/// Subject line of the verification email.
pub const VERIFICATION_SUBJECT: &str = "Verify Your NeuroDetect Account";

const LOGO_URL: &str =
    "https://res.cloudinary.com/dapaxygk0/image/upload/f_auto,q_auto/brain-circuit_xpu8ov";

/// Link to the frontend page that completes verification.
///
/// Query values are percent-encoded, so addresses with `+` survive the trip.
pub fn verification_link(frontend_url: &Url, email: &str, token: &str) -> Url {
    let mut link = frontend_url.clone();
    let path = format!("{}/verify-email", frontend_url.path().trim_end_matches('/'));
    link.set_path(&path);
    link.query_pairs_mut()
        .clear()
        .append_pair("email", email)
        .append_pair("token", token);
    link
}

/// Render the verification email for a new account.
pub fn verification_email(frontend_url: &Url, email: &str, token: &str, username: &str) -> EmailMessage {
    let link = verification_link(frontend_url, email, token);
    let year = Utc::now().year();
    let username = escape_html(username);
    let link = escape_html(link.as_str());

    let html = format!(
        r#"<!DOCTYPE html>
<html lang="en">
<head>
    <meta charset="UTF-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <title>Verify Your Email</title>
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, Helvetica, Arial, sans-serif; margin: 0; padding: 20px; background-color: #f8fafc; }}
        .container {{ max-width: 600px; margin: 0 auto; background-color: #ffffff; border-radius: 12px; box-shadow: 0 4px 6px -1px rgb(0 0 0 / 0.1); overflow: hidden; }}
        .header {{ text-align: center; padding: 20px; border-bottom: 1px solid #e5e7eb; background-color: #f1f5f9; }}
        .header img {{ width: 48px; height: 48px; }}
        .header h1 {{ font-size: 24px; font-weight: 700; color: #111827; margin: 10px 0 0; }}
        .content {{ padding: 30px 20px; color: #374151; line-height: 1.6; }}
        .content h2 {{ font-size: 20px; color: #111827; margin-top: 0; }}
        .button-container {{ text-align: center; margin: 30px 0; }}
        .button {{ display: inline-block; padding: 14px 28px; font-size: 16px; font-weight: 600; color: #ffffff !important; text-decoration: none; border-radius: 8px; background: linear-gradient(to right, #2563eb, #9333ea); }}
        .footer {{ text-align: center; font-size: 12px; color: #6b7280; padding: 20px; border-top: 1px solid #e5e7eb; background-color: #f8fafc; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="header">
            <img src="{logo}" alt="NeuroDetect Logo">
            <h1>NeuroDetect</h1>
        </div>
        <div class="content">
            <h2>Hello {username},</h2>
            <p>Thank you for signing up for NeuroDetect. To complete your registration, please verify your email address by clicking the button below.</p>
            <div class="button-container">
                <a href="{link}" class="button">Verify Now</a>
            </div>
            <p>If you did not create an account, no further action is required.</p>
        </div>
        <div class="footer">
            <p><b>Disclaimer:</b> NeuroDetect is a tool for informational and research purposes only and is not a substitute for professional medical advice, diagnosis, or treatment. Always seek the advice of your physician or other qualified health provider.</p>
            <p>&copy; {year} NeuroDetect. All rights reserved.</p>
        </div>
    </div>
</body>
</html>
"#,
        logo = LOGO_URL,
        username = username,
        link = link,
        year = year,
    );

    EmailMessage {
        to: email.to_string(),
        subject: VERIFICATION_SUBJECT.to_string(),
        html,
    }
}

fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
