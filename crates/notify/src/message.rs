use chrono::{DateTime, Utc};

use leadrobin_core::{AcceptancePolicy, Lead, User};

use crate::notifier::AssignmentNotice;

/// Renders the assignment email for a seller. The body is plain text; the
/// relay service owns any HTML presentation.
pub fn assignment_notice(
    lead: &Lead,
    seller: &User,
    policy: &AcceptancePolicy,
    assigned_at: DateTime<Utc>,
) -> AssignmentNotice {
    let accept_by = policy.deadline(assigned_at);
    AssignmentNotice {
        lead_id: lead.id.clone(),
        seller_id: seller.id.clone(),
        email_to: seller.email.clone(),
        subject: format!("New lead: {}", lead.subject),
        body: render_body(lead, seller, accept_by),
        accept_by,
    }
}

fn render_body(lead: &Lead, seller: &User, accept_by: DateTime<Utc>) -> String {
    let mut body = String::new();

    body.push_str(&format!("Hi {},\n\n", seller.first_name));
    match lead.facility {
        Some(facility) => {
            body.push_str(&format!("A new lead is waiting for you at {facility}.\n\n"));
        }
        None => body.push_str("A new lead is waiting for you.\n\n"),
    }

    body.push_str(&format!("Contact: {}\n", lead.contact_name));
    if let Some(email) = lead.contact_email.as_deref().filter(|value| !value.trim().is_empty()) {
        body.push_str(&format!("Email:   {email}\n"));
    }
    if let Some(phone) = lead.contact_phone.as_deref().filter(|value| !value.trim().is_empty()) {
        body.push_str(&format!("Phone:   {phone}\n"));
    }
    body.push_str(&format!("Subject: {}\n", lead.subject));
    if let Some(listing_id) = lead.listing_id.as_deref() {
        body.push_str(&format!("Listing: {listing_id}\n"));
    }

    if let Some(message) = lead.message.as_deref().filter(|value| !value.trim().is_empty()) {
        body.push_str(&format!("\n\"{}\"\n", message.trim()));
    }

    body.push_str(&format!(
        "\nAccept or decline before {}. Unanswered leads are passed to the next seller in rotation.\n",
        accept_by.format("%Y-%m-%d %H:%M UTC"),
    ));

    body
}

#[cfg(test)]
mod tests {
    use chrono::{TimeZone, Utc};

    use super::assignment_notice;
    use leadrobin_core::{
        AcceptancePolicy, Facility, Lead, LeadSource, LeadStatus, NewLead, Role, User, UserId,
    };

    fn seller() -> User {
        let now = Utc::now();
        User {
            id: UserId("user-anna".to_string()),
            first_name: "Anna".to_string(),
            last_name: "Bergström".to_string(),
            email: "anna.bergstrom@bilhuset.se".to_string(),
            role: Role::Seller,
            is_active: true,
            email_on_assignment: true,
            created_at: now,
            updated_at: now,
        }
    }

    fn lead() -> Lead {
        Lead::create(
            NewLead {
                facility: Some(Facility::Falkenberg),
                source: LeadSource::WebForm,
                contact_name: "Maria Johansson".to_string(),
                contact_email: Some("maria.johansson@example.se".to_string()),
                contact_phone: Some("+46701234567".to_string()),
                subject: "Provkörning Volvo XC60".to_string(),
                message: Some("Kan jag boka en provkörning på lördag?".to_string()),
                listing_id: None,
            },
            Utc::now(),
        )
    }

    #[test]
    fn notice_carries_the_deadline_and_recipient() {
        let lead = lead();
        let assigned_at = Utc.with_ymd_and_hms(2026, 2, 12, 8, 30, 0).unwrap();
        let notice = assignment_notice(&lead, &seller(), &AcceptancePolicy::default(), assigned_at);

        assert_eq!(notice.email_to, "anna.bergstrom@bilhuset.se");
        assert_eq!(notice.subject, "New lead: Provkörning Volvo XC60");
        assert_eq!(notice.accept_by, Utc.with_ymd_and_hms(2026, 2, 12, 20, 30, 0).unwrap());
        assert!(notice.body.contains("Hi Anna,"));
        assert!(notice.body.contains("at Falkenberg"));
        assert!(notice.body.contains("Contact: Maria Johansson"));
        assert!(notice.body.contains("Phone:   +46701234567"));
        assert!(notice.body.contains("2026-02-12 20:30 UTC"));
    }

    #[test]
    fn missing_contact_details_are_omitted_rather_than_blank() {
        let mut lead = lead();
        lead.contact_email = None;
        lead.contact_phone = Some("   ".to_string());
        lead.message = None;

        let notice =
            assignment_notice(&lead, &seller(), &AcceptancePolicy::default(), Utc::now());
        assert!(!notice.body.contains("Email:"));
        assert!(!notice.body.contains("Phone:"));
        assert!(!notice.body.contains('"'));
        assert_eq!(notice.lead_id, lead.id);

        assert!(lead.status == LeadStatus::New);
    }

    #[test]
    fn marketplace_listing_reference_is_included() {
        let mut lead = lead();
        lead.listing_id = Some("blocket-884213".to_string());

        let notice =
            assignment_notice(&lead, &seller(), &AcceptancePolicy::default(), Utc::now());
        assert!(notice.body.contains("Listing: blocket-884213"));
    }
}
