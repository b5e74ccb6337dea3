// Plain-text email templates.

use crate::notifications::{EmailAttachment, OutgoingEmail};

pub fn application_received(to: &str, candidate_name: &str, job_title: &str) -> OutgoingEmail {
    OutgoingEmail {
        to: vec![to.to_string()],
        subject: format!("Application received: {job_title}"),
        text_body: format!(
            "Hi {candidate_name},\n\n\
             Thanks for applying to \"{job_title}\". Your application is in and \
             the hiring team will review it shortly. You can track its status \
             from your dashboard.\n\n\
             The Hirewire team"
        ),
        attachments: vec![],
    }
}

pub fn status_changed(
    to: &str,
    candidate_name: &str,
    job_title: &str,
    new_status: &str,
) -> OutgoingEmail {
    let line = match new_status {
        "interviewing" => "You have been invited to an AI-assisted interview. Log in to start it when you are ready.".to_string(),
        "offered" => "Congratulations, the hiring team would like to make you an offer.".to_string(),
        "hired" => "Welcome aboard! The hiring team will be in touch with next steps.".to_string(),
        "rejected" => "After careful review the hiring team has decided not to move forward at this time.".to_string(),
        other => format!("Your application status is now \"{}\".", other.replace('_', " ")),
    };

    OutgoingEmail {
        to: vec![to.to_string()],
        subject: format!("Update on your application: {job_title}"),
        text_body: format!("Hi {candidate_name},\n\n{line}\n\nThe Hirewire team"),
        attachments: vec![],
    }
}

pub fn report_ready(
    to: Vec<String>,
    candidate_name: &str,
    job_title: &str,
    attachments: Vec<EmailAttachment>,
) -> OutgoingEmail {
    OutgoingEmail {
        to,
        subject: format!("Interview report: {candidate_name} for {job_title}"),
        text_body: format!(
            "The interview report for {candidate_name} ({job_title}) is attached.\n\n\
             Scores are produced by an automated assessment and should be reviewed \
             alongside the transcript before making a decision.\n\n\
             The Hirewire team"
        ),
        attachments,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_changed_uses_specific_copy() {
        let email = status_changed("c@x.io", "Ada", "Platform Engineer", "offered");
        assert!(email.text_body.contains("offer"));
        assert_eq!(email.subject, "Update on your application: Platform Engineer");
    }

    #[test]
    fn test_status_changed_falls_back_to_generic_copy() {
        let email = status_changed("c@x.io", "Ada", "Platform Engineer", "screened");
        assert!(email.text_body.contains("\"screened\""));
    }

    #[test]
    fn test_report_ready_carries_attachments() {
        let email = report_ready(
            vec!["hr@acme.test".into()],
            "Ada",
            "Platform Engineer",
            vec![EmailAttachment {
                file_name: "report.pdf".into(),
                content_type: "application/pdf",
                bytes: vec![1, 2, 3],
            }],
        );
        assert_eq!(email.attachments.len(), 1);
        assert!(email.subject.contains("Ada"));
    }
}
