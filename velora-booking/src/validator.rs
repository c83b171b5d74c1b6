use chrono::{DateTime, Duration, Utc};

use velora_core::catalog::ServiceInfo;
use velora_core::FieldViolation;
use velora_gate::Interval;

use crate::models::{BookingRules, CheckoutRequest, ValidBooking};

/// Check every rule against the raw request. Rules are independent and all
/// evaluated — no short-circuiting — so the caller sees the complete list of
/// violations in one round trip. Pure and deterministic given `now`.
pub fn validate(
    req: &CheckoutRequest,
    service: &ServiceInfo,
    rules: &BookingRules,
    now: DateTime<Utc>,
) -> Result<ValidBooking, Vec<FieldViolation>> {
    let mut violations = Vec::new();

    let earliest = now + Duration::minutes(rules.min_lead_minutes);
    let latest = now + Duration::days(rules.max_advance_days);
    if req.start_time < earliest {
        violations.push(FieldViolation::new(
            "startTime",
            format!(
                "must be at least {} minutes in the future",
                rules.min_lead_minutes
            ),
        ));
    }
    if req.start_time > latest {
        violations.push(FieldViolation::new(
            "startTime",
            format!(
                "cannot be more than {} days in advance",
                rules.max_advance_days
            ),
        ));
    }

    if req.end_time <= req.start_time {
        violations.push(FieldViolation::new("endTime", "must be after startTime"));
    } else if req.end_time - req.start_time > Duration::minutes(rules.max_duration_minutes) {
        violations.push(FieldViolation::new(
            "endTime",
            format!(
                "duration cannot exceed {} hours",
                rules.max_duration_minutes / 60
            ),
        ));
    }

    let notes = match &req.notes {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.chars().count() > 500 {
                violations.push(FieldViolation::new(
                    "notes",
                    "must be at most 500 characters",
                ));
                None
            } else if trimmed.is_empty() {
                None
            } else {
                Some(escape_html(trimmed))
            }
        }
        None => None,
    };

    let contact_phone = match &req.client_phone {
        Some(raw) => {
            let trimmed = raw.trim();
            if trimmed.is_empty() {
                None
            } else if trimmed.chars().count() > 20 {
                violations.push(FieldViolation::new(
                    "clientPhone",
                    "must be at most 20 characters",
                ));
                None
            } else if !is_plausible_phone(trimmed) {
                violations.push(FieldViolation::new(
                    "clientPhone",
                    "is not a valid phone number",
                ));
                None
            } else {
                Some(trimmed.to_string())
            }
        }
        None => None,
    };

    if !violations.is_empty() {
        return Err(violations);
    }

    // endTime > startTime was checked above, so this cannot fail
    let interval = Interval::new(req.start_time, req.end_time)
        .map_err(|_| vec![FieldViolation::new("endTime", "must be after startTime")])?;

    Ok(ValidBooking {
        resource_id: service.resource_id,
        service_id: service.id,
        interval,
        amount_cents: service.price_cents,
        currency: service.currency.clone(),
        notes,
        contact_phone,
    })
}

/// Permissive international format: optional leading `+`, then digits with
/// common separators, at least 7 digits total.
fn is_plausible_phone(s: &str) -> bool {
    let mut digits = 0;
    for (i, c) in s.chars().enumerate() {
        match c {
            '0'..='9' => digits += 1,
            '+' if i == 0 => {}
            ' ' | '-' | '.' | '(' | ')' => {}
            _ => return false,
        }
    }
    digits >= 7
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(c),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn service() -> ServiceInfo {
        ServiceInfo {
            id: Uuid::new_v4(),
            name: "Cut & Color".to_string(),
            resource_id: Uuid::new_v4(),
            price_cents: 8500,
            currency: "USD".to_string(),
            duration_minutes: 90,
        }
    }

    fn request(start_offset: Duration, duration: Duration) -> CheckoutRequest {
        let now = Utc::now();
        CheckoutRequest {
            service_id: Uuid::new_v4(),
            start_time: now + start_offset,
            end_time: now + start_offset + duration,
            notes: None,
            client_phone: None,
        }
    }

    fn check(req: &CheckoutRequest) -> Result<ValidBooking, Vec<FieldViolation>> {
        validate(req, &service(), &BookingRules::default(), Utc::now())
    }

    fn field_names(violations: &[FieldViolation]) -> Vec<&str> {
        violations.iter().map(|v| v.field.as_str()).collect()
    }

    #[test]
    fn lead_time_boundary() {
        let too_soon = request(Duration::minutes(29), Duration::hours(1));
        let violations = check(&too_soon).unwrap_err();
        assert_eq!(field_names(&violations), vec!["startTime"]);

        let ok = request(Duration::minutes(31), Duration::hours(1));
        assert!(check(&ok).is_ok());
    }

    #[test]
    fn advance_window_boundary() {
        let too_far = request(Duration::days(181), Duration::hours(1));
        let violations = check(&too_far).unwrap_err();
        assert_eq!(field_names(&violations), vec!["startTime"]);

        let ok = request(Duration::days(179), Duration::hours(1));
        assert!(check(&ok).is_ok());
    }

    #[test]
    fn duration_boundary_exactly_eight_hours() {
        let exact = request(Duration::hours(1), Duration::hours(8));
        assert!(check(&exact).is_ok());

        let over = request(Duration::hours(1), Duration::hours(8) + Duration::seconds(1));
        let violations = check(&over).unwrap_err();
        assert_eq!(field_names(&violations), vec!["endTime"]);
    }

    #[test]
    fn end_before_start_is_rejected() {
        let mut req = request(Duration::hours(2), Duration::hours(1));
        req.end_time = req.start_time - Duration::minutes(5);
        let violations = check(&req).unwrap_err();
        assert_eq!(field_names(&violations), vec!["endTime"]);
    }

    #[test]
    fn notes_length_boundary() {
        let mut req = request(Duration::hours(1), Duration::hours(1));
        req.notes = Some("x".repeat(501));
        let violations = check(&req).unwrap_err();
        assert_eq!(violations.len(), 1);
        assert_eq!(violations[0].field, "notes");
        assert!(violations[0].message.contains("500 characters"));

        req.notes = Some("x".repeat(500));
        assert!(check(&req).is_ok());
    }

    #[test]
    fn notes_are_trimmed_and_escaped() {
        let mut req = request(Duration::hours(1), Duration::hours(1));
        req.notes = Some("  please use the <b>back</b> entrance & ring twice  ".to_string());
        let booking = check(&req).unwrap();
        assert_eq!(
            booking.notes.as_deref(),
            Some("please use the &lt;b&gt;back&lt;/b&gt; entrance &amp; ring twice")
        );
    }

    #[test]
    fn phone_rules() {
        let mut req = request(Duration::hours(1), Duration::hours(1));
        req.client_phone = Some("not-a-phone".to_string());
        let violations = check(&req).unwrap_err();
        assert_eq!(field_names(&violations), vec!["clientPhone"]);

        req.client_phone = Some("+1 (555) 867-5309".to_string());
        let booking = check(&req).unwrap();
        assert_eq!(booking.contact_phone.as_deref(), Some("+1 (555) 867-5309"));

        // 21 characters after trimming
        req.client_phone = Some("123456789012345678901".to_string());
        let violations = check(&req).unwrap_err();
        assert_eq!(field_names(&violations), vec!["clientPhone"]);

        // too few digits
        req.client_phone = Some("12345".to_string());
        assert!(check(&req).is_err());
    }

    #[test]
    fn all_violations_are_reported_together() {
        let mut req = request(Duration::minutes(5), Duration::hours(9));
        req.notes = Some("y".repeat(600));
        req.client_phone = Some("bogus!".to_string());
        let violations = check(&req).unwrap_err();
        let fields = field_names(&violations);
        assert!(fields.contains(&"startTime"));
        assert!(fields.contains(&"endTime"));
        assert!(fields.contains(&"notes"));
        assert!(fields.contains(&"clientPhone"));
        assert_eq!(violations.len(), 4);
    }

    #[test]
    fn price_and_resource_come_from_the_catalog() {
        let svc = service();
        let req = request(Duration::hours(1), Duration::hours(1));
        let booking = validate(&req, &svc, &BookingRules::default(), Utc::now()).unwrap();
        assert_eq!(booking.resource_id, svc.resource_id);
        assert_eq!(booking.amount_cents, 8500);
        assert_eq!(booking.currency, "USD");
    }
}
