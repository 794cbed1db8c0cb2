//! Email templates for one-time passcodes.

use barakah_storage::OtpPurpose;

/// Content for passcode emails.
pub struct OtpEmailContent {
    pub subject: String,
    pub text: String,
    pub html: String,
}

impl OtpEmailContent {
    /// Render the email for `code`, worded for the flow it belongs to.
    pub fn new(code: &str, purpose: OtpPurpose, valid_minutes: i64) -> Self {
        Self {
            subject: Self::subject(purpose).to_string(),
            text: Self::text_template(code, purpose, valid_minutes),
            html: Self::html_template(code, purpose, valid_minutes),
        }
    }

    fn subject(purpose: OtpPurpose) -> &'static str {
        match purpose {
            OtpPurpose::SignUp => "Verify your Barakah account",
            OtpPurpose::Login => "Your Barakah sign-in code",
            OtpPurpose::ForgotPassword => "Reset your Barakah password",
        }
    }

    fn intro(purpose: OtpPurpose) -> &'static str {
        match purpose {
            OtpPurpose::SignUp => "Welcome to Barakah! Use this code to confirm your email address.",
            OtpPurpose::Login => "Use this code to finish signing in to Barakah.",
            OtpPurpose::ForgotPassword => "Use this code to reset your Barakah password.",
        }
    }

    fn text_template(code: &str, purpose: OtpPurpose, valid_minutes: i64) -> String {
        format!(
            r#"{}

Your verification code is: {}

This code will expire in {} minutes.

If you didn't request this code, please ignore this email.

--
Barakah"#,
            Self::intro(purpose),
            code,
            valid_minutes
        )
    }

    fn html_template(code: &str, purpose: OtpPurpose, valid_minutes: i64) -> String {
        format!(
            r#"<!DOCTYPE html>
<html>
<head>
    <meta charset="utf-8">
    <meta name="viewport" content="width=device-width, initial-scale=1.0">
    <style>
        body {{ font-family: -apple-system, BlinkMacSystemFont, 'Segoe UI', Roboto, sans-serif; line-height: 1.6; color: #1f2933; margin: 0; padding: 0; background: #f4f7f5; }}
        .container {{ max-width: 600px; margin: 0 auto; padding: 40px 20px; }}
        .card {{ background: white; border-radius: 8px; padding: 40px; }}
        .code {{ font-size: 36px; font-weight: bold; letter-spacing: 8px; color: #0f766e; text-align: center; padding: 24px; background: #ecfdf5; border-radius: 8px; margin: 24px 0; font-family: 'SF Mono', Monaco, monospace; }}
        .expires {{ color: #52606d; font-size: 14px; text-align: center; }}
        .footer {{ margin-top: 32px; padding-top: 20px; border-top: 1px solid #e4e7eb; color: #7b8794; font-size: 12px; }}
    </style>
</head>
<body>
    <div class="container">
        <div class="card">
            <p>{}</p>
            <div class="code">{}</div>
            <p class="expires">This code will expire in {} minutes.</p>
            <div class="footer">
                <p>If you didn't request this code, please ignore this email.</p>
            </div>
        </div>
    </div>
</body>
</html>"#,
            Self::intro(purpose),
            code,
            valid_minutes
        )
    }
}
