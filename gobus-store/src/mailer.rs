use async_trait::async_trait;
use chrono::NaiveDate;
use lettre::message::MultiPart;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use tracing::info;

use gobus_core::notify::{Notifier, NotifyError};

/// SMTP-backed notifier. Delivery runs on a blocking task; callers are
/// expected to spawn it detached and log failures.
pub struct SmtpMailer {
    host: String,
    port: u16,
    credentials: Credentials,
    from_email: String,
    from_name: String,
}

impl SmtpMailer {
    pub fn new(
        host: String,
        port: u16,
        username: String,
        password: String,
        from_email: String,
        from_name: String,
    ) -> Self {
        Self {
            host,
            port,
            credentials: Credentials::new(username, password),
            from_email,
            from_name,
        }
    }

    fn transport(&self) -> Result<SmtpTransport, NotifyError> {
        Ok(SmtpTransport::relay(&self.host)
            .map_err(|e| NotifyError(format!("SMTP relay error: {e}")))?
            .port(self.port)
            .credentials(self.credentials.clone())
            .build())
    }

    fn from_header(&self) -> String {
        format!("{} <{}>", self.from_name, self.from_email)
    }
}

#[async_trait]
impl Notifier for SmtpMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html: &str,
        text: &str,
    ) -> Result<(), NotifyError> {
        let email = Message::builder()
            .from(
                self.from_header()
                    .parse()
                    .map_err(|e| NotifyError(format!("invalid from address: {e}")))?,
            )
            .to(to
                .parse()
                .map_err(|e| NotifyError(format!("invalid to address: {e}")))?)
            .subject(subject)
            .multipart(MultiPart::alternative_plain_html(
                text.to_string(),
                html.to_string(),
            ))
            .map_err(|e| NotifyError(format!("failed to build email: {e}")))?;

        let mailer = self.transport()?;

        tokio::task::spawn_blocking(move || {
            mailer
                .send(&email)
                .map(|_| ())
                .map_err(|e| NotifyError(format!("failed to send email: {e}")))
        })
        .await
        .map_err(|e| NotifyError(format!("email task failed: {e}")))?
    }
}

/// Logs instead of sending. Used when SMTP is disabled in configuration.
pub struct LogMailer;

#[async_trait]
impl Notifier for LogMailer {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        _html: &str,
        _text: &str,
    ) -> Result<(), NotifyError> {
        info!("email (smtp disabled) to={} subject={}", to, subject);
        Ok(())
    }
}

// ============================================================================
// Templates
// ============================================================================

/// Single configuration structure for booking emails.
pub struct BookingEmail {
    pub rider_name: String,
    pub reference: String,
    pub bus_label: String,
    pub route_label: String,
    pub travel_date: NaiveDate,
    pub seat_numbers: Vec<u32>,
    pub total_price_cents: i64,
}

pub struct EmailContent {
    pub subject: String,
    pub html: String,
    pub text: String,
}

fn format_price(cents: i64) -> String {
    format!("${}.{:02}", cents / 100, (cents % 100).abs())
}

fn format_seats(seats: &[u32]) -> String {
    seats
        .iter()
        .map(|s| s.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn booking_confirmation(email: &BookingEmail) -> EmailContent {
    let seats = format_seats(&email.seat_numbers);
    let price = format_price(email.total_price_cents);
    let subject = format!("Your GoBus booking {} is confirmed", email.reference);

    let text = format!(
        "Hi {},\n\nYour booking is confirmed.\n\nReference: {}\nBus: {}\nRoute: {}\nTravel date: {}\nSeats: {}\nTotal: {}\n\nSafe travels,\nThe GoBus Team\n",
        email.rider_name,
        email.reference,
        email.bus_label,
        email.route_label,
        email.travel_date,
        seats,
        price,
    );

    let html = format!(
        r#"<div style="max-width: 600px; margin: auto; font-family: Arial, sans-serif; color: #333; line-height: 1.6;">
  <h2 style="color: #2b6cb0; text-align: center;">Booking confirmed</h2>
  <p>Hi {},</p>
  <p>Your booking is confirmed. Keep your reference handy when boarding.</p>
  <table style="width: 100%; border-collapse: collapse; font-size: 15px;">
    <tr><td style="padding: 6px 0; color: #555;">Reference</td><td><strong>{}</strong></td></tr>
    <tr><td style="padding: 6px 0; color: #555;">Bus</td><td>{}</td></tr>
    <tr><td style="padding: 6px 0; color: #555;">Route</td><td>{}</td></tr>
    <tr><td style="padding: 6px 0; color: #555;">Travel date</td><td>{}</td></tr>
    <tr><td style="padding: 6px 0; color: #555;">Seats</td><td>{}</td></tr>
    <tr><td style="padding: 6px 0; color: #555;">Total</td><td>{}</td></tr>
  </table>
  <p style="margin-top: 25px;">Safe travels,<br/><strong>The GoBus Team</strong></p>
</div>"#,
        email.rider_name,
        email.reference,
        email.bus_label,
        email.route_label,
        email.travel_date,
        seats,
        price,
    );

    EmailContent {
        subject,
        html,
        text,
    }
}

pub fn booking_cancellation(email: &BookingEmail) -> EmailContent {
    let seats = format_seats(&email.seat_numbers);
    let subject = format!("Your GoBus booking {} was cancelled", email.reference);

    let text = format!(
        "Hi {},\n\nYour booking {} ({}, {}) for {} has been cancelled. Seats {} have been released.\n\nThe GoBus Team\n",
        email.rider_name,
        email.reference,
        email.bus_label,
        email.route_label,
        email.travel_date,
        seats,
    );

    let html = format!(
        r#"<div style="max-width: 600px; margin: auto; font-family: Arial, sans-serif; color: #333; line-height: 1.6;">
  <h2 style="color: #c53030; text-align: center;">Booking cancelled</h2>
  <p>Hi {},</p>
  <p>Your booking <strong>{}</strong> ({}, {}) for {} has been cancelled.
  Seats {} have been released.</p>
  <p style="margin-top: 25px;"><strong>The GoBus Team</strong></p>
</div>"#,
        email.rider_name,
        email.reference,
        email.bus_label,
        email.route_label,
        email.travel_date,
        seats,
    );

    EmailContent {
        subject,
        html,
        text,
    }
}

pub fn welcome(username: &str) -> EmailContent {
    let subject = format!("Welcome to GoBus, {username}!");

    let text = format!(
        "Welcome to GoBus, {username}!\n\nWith GoBus you can book bus tickets, track routes, and enjoy a smooth travel experience.\n\nSafe travels,\nThe GoBus Team\n",
    );

    let html = format!(
        r#"<div style="max-width: 600px; margin: auto; font-family: Arial, sans-serif; color: #333; line-height: 1.6;">
  <h2 style="color: #2b6cb0; text-align: center;">Welcome to GoBus, {username}!</h2>
  <p style="text-align: center;">With <strong>GoBus</strong> you can book bus tickets, track routes,
  and enjoy a smooth travel experience.</p>
  <p style="text-align: center; margin-top: 25px;">Safe travels,<br/><strong>The GoBus Team</strong></p>
</div>"#,
    );

    EmailContent {
        subject,
        html,
        text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture() -> BookingEmail {
        BookingEmail {
            rider_name: "Asha".to_string(),
            reference: "BK-TEST4200001".to_string(),
            bus_label: "Coastal Express".to_string(),
            route_label: "Harbor to Summit".to_string(),
            travel_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap(),
            seat_numbers: vec![7, 8],
            total_price_cents: 2000,
        }
    }

    #[test]
    fn confirmation_contains_booking_details() {
        let content = booking_confirmation(&fixture());
        assert!(content.subject.contains("BK-TEST4200001"));
        assert!(content.html.contains("7, 8"));
        assert!(content.text.contains("$20.00"));
        assert!(content.text.contains("2025-03-01"));
    }

    #[test]
    fn price_formatting_pads_cents() {
        assert_eq!(format_price(1005), "$10.05");
        assert_eq!(format_price(90), "$0.90");
    }
}
