//! Notification email templates

use chrono::{DateTime, Utc};

use super::message::{Attachment, MailMessage};

/// Facts shown in the report notification
#[derive(Debug, Clone, PartialEq)]
pub struct ReportEmail<'a> {
    pub job_id: &'a str,
    pub title: &'a str,
    pub report_type: &'a str,
    pub record_count: usize,
    pub summary: &'a str,
    pub generated_at: DateTime<Utc>,
    /// Analysis was based on a digest rather than every row
    pub sampled: bool,
}

impl ReportEmail<'_> {
    pub fn subject(&self) -> String {
        format!("{} - report ready ({} records)", self.title, self.record_count)
    }

    pub fn text_body(&self, attachment_name: &str) -> String {
        let mut body = format!(
            "Your {} report is ready.\n\n\
             Report type: {}\n\
             Records: {}\n\
             Generated: {}\n\
             Reference: {}\n\n\
             Summary\n-------\n{}\n",
            self.title,
            self.report_type,
            self.record_count,
            self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            self.job_id,
            self.summary.trim()
        );
        if self.sampled {
            body.push_str("\nThe analysis was based on a representative sample of the records.\n");
        }
        body.push_str(&format!(
            "\nThe full report is attached as {attachment_name}.\n\n\
             This is an automated message. Please do not reply.\n"
        ));
        body
    }

    pub fn html_body(&self, attachment_name: &str) -> String {
        let sampled = if self.sampled {
            "<p class=\"note\">The analysis was based on a representative sample of the records.</p>\n"
        } else {
            ""
        };
        format!(
            r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="UTF-8">
<title>{title}</title>
<style>
  body {{ font-family: 'Segoe UI', Tahoma, Geneva, Verdana, sans-serif; line-height: 1.6; color: #333; max-width: 600px; margin: 0 auto; padding: 20px; background-color: #f5f5f5; }}
  .container {{ background: white; padding: 30px; border-radius: 10px; }}
  .header {{ text-align: center; border-bottom: 2px solid #e0e0e0; padding-bottom: 16px; }}
  .info {{ background: #f8f9fa; padding: 16px; border-left: 4px solid #3498db; margin: 20px 0; }}
  .note {{ color: #7f8c8d; font-style: italic; }}
  .footer {{ color: #7f8c8d; font-size: 12px; text-align: center; margin-top: 24px; }}
</style>
</head>
<body>
<div class="container">
<div class="header"><h1>{title}</h1><p>Your report is ready</p></div>
<div class="info">
<p><strong>Report type:</strong> {report_type}<br>
<strong>Records:</strong> {records}<br>
<strong>Generated:</strong> {generated}<br>
<strong>Reference:</strong> {job_id}</p>
</div>
<h3>Summary</h3>
<p>{summary}</p>
{sampled}<p>The full report is attached as <strong>{attachment}</strong>.</p>
<div class="footer">This is an automated message. Please do not reply.</div>
</div>
</body>
</html>
"#,
            title = escape_html(self.title),
            report_type = escape_html(self.report_type),
            records = self.record_count,
            generated = self.generated_at.format("%Y-%m-%d %H:%M UTC"),
            job_id = escape_html(self.job_id),
            summary = escape_html(self.summary.trim()).replace('\n', "<br>\n"),
            sampled = sampled,
            attachment = escape_html(attachment_name),
        )
    }

    /// Build the full message
    pub fn message(&self, from: &str, to: &str, attachment: Attachment) -> MailMessage {
        MailMessage {
            idempotency_key: self.job_id.to_string(),
            from: from.to_string(),
            to: to.trim().to_string(),
            subject: self.subject(),
            text_body: self.text_body(&attachment.filename),
            html_body: self.html_body(&attachment.filename),
            attachments: Vec::new(),
        }
        .with_attachment(attachment)
    }
}

/// Escape text for HTML element content and attribute values
pub fn escape_html(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            other => out.push(other),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn email() -> ReportEmail<'static> {
        ReportEmail {
            job_id: "4f1c",
            title: "Campus Assets Management System",
            report_type: "campus_assets",
            record_count: 42,
            summary: "Lab <1> holds most value.\nMice are cheap.",
            generated_at: Utc.with_ymd_and_hms(2024, 5, 1, 9, 30, 0).unwrap(),
            sampled: true,
        }
    }

    #[test]
    fn test_subject() {
        assert_eq!(
            email().subject(),
            "Campus Assets Management System - report ready (42 records)"
        );
    }

    #[test]
    fn test_text_body() {
        let body = email().text_body("report.pdf");
        assert!(body.contains("Records: 42"));
        assert!(body.contains("Generated: 2024-05-01 09:30 UTC"));
        assert!(body.contains("representative sample"));
        assert!(body.contains("attached as report.pdf"));
    }

    #[test]
    fn test_html_body_escapes_content() {
        let html = email().html_body("report.pdf");
        assert!(html.contains("Lab &lt;1&gt; holds most value.<br>"));
        assert!(!html.contains("<1>"));
        assert!(html.starts_with("<!DOCTYPE html>"));
    }

    #[test]
    fn test_message_carries_job_id_as_key() {
        let message = email().message(
            "reports@example.org",
            " ops@example.org ",
            Attachment::pdf("report.pdf", vec![1, 2, 3]),
        );
        assert_eq!(message.idempotency_key, "4f1c");
        assert_eq!(message.to, "ops@example.org");
        assert_eq!(message.attachments.len(), 1);
    }
}
