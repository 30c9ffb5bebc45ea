use crate::infra::seeded_store;
use chrono::{Local, NaiveDate};
use clap::Args;
use rentwise::config::MarketplaceConfig;
use rentwise::error::AppError;
use rentwise::marketplace::{
    Actor, BookingRequest, CardDetails, CategoryRatings, FeedbackSubmission, ListingDraft,
    Marketplace, MarketplaceError, PaymentMethod, PaymentRequest, PaymentType, ReportSubmission,
    Role, SimulatedGateway, StatusChange,
};
use std::sync::Arc;

#[derive(Args, Debug, Default)]
pub(crate) struct DemoArgs {
    /// Move-in date for the demo bookings (YYYY-MM-DD). Defaults to today + 30 days.
    #[arg(long, value_parser = parse_date)]
    pub(crate) move_in: Option<NaiveDate>,
    /// Probability that the simulated gateway approves a card (0.0 - 1.0).
    #[arg(long)]
    pub(crate) success_rate: Option<f64>,
}

pub(crate) fn run_demo(args: DemoArgs) -> Result<(), AppError> {
    let move_in = args
        .move_in
        .unwrap_or_else(|| Local::now().date_naive() + chrono::Duration::days(30));
    let success_rate = args
        .success_rate
        .unwrap_or(MarketplaceConfig::default().settlement_success_rate);

    let store = Arc::new(seeded_store().map_err(MarketplaceError::from)?);
    let market = Marketplace::new(store, Arc::new(SimulatedGateway::new(success_rate)));
    let admin = Actor::new("admin-1", Role::Admin);
    let owner = Actor::new("owner-1", Role::Owner);
    let tenant = Actor::new("tenant-1", Role::Tenant);

    println!("Rental marketplace demo");
    let listing = market.listings.create_listing(
        &owner,
        ListingDraft {
            title: "Baner 2BHK near the IT park".to_string(),
            description: "Semi-furnished, covered parking, 24h water".to_string(),
            city: "Pune".to_string(),
            rent: 45_000,
            security_deposit: Some(90_000),
            photo_urls: Vec::new(),
        },
    )?;
    let listing = market
        .listings
        .review_listing(&admin, &listing.id, "Approved")?;
    println!(
        "- Listing {} approved: rent {} / deposit {} (available: {})",
        listing.id, listing.rent, listing.security_deposit, listing.is_available
    );

    let booking = market.bookings.create(
        &tenant,
        BookingRequest {
            property_id: listing.id.clone(),
            move_in_date: move_in,
            lease_duration_months: 11,
            message: Some("Moving with family, no pets".to_string()),
        },
    )?;
    println!(
        "- Booking {} requested for {} -> total due {}",
        booking.id, booking.move_in_date, booking.total_amount
    );

    let booking = market.bookings.transition(
        &owner,
        &booking.id,
        StatusChange {
            status: "Approved".to_string(),
            owner_response: Some("Welcome aboard".to_string()),
        },
    )?;
    let listing = market.listings.get_listing(&listing.id)?;
    println!(
        "- Booking {:?}; listing now {:?} (available: {})",
        booking.status, listing.status, listing.is_available
    );

    match market.bookings.create(
        &tenant,
        BookingRequest {
            property_id: listing.id.clone(),
            move_in_date: move_in,
            lease_duration_months: 6,
            message: None,
        },
    ) {
        Ok(extra) => println!("  Unexpected second booking {}", extra.id),
        Err(err) => println!("  Second booking refused: [{}] {}", err.code(), err),
    }

    let payment = market.payments.create_payment(
        &tenant,
        PaymentRequest {
            property_id: listing.id.clone(),
            booking_id: Some(booking.id.clone()),
            amount: booking.total_amount,
            payment_type: PaymentType::SecurityDeposit,
            payment_method: PaymentMethod::Card,
            description: Some("Deposit and first month".to_string()),
            due_date: Some(move_in),
            transaction_id: None,
        },
    )?;
    let receipt = market.payments.process(
        &tenant,
        &payment.id,
        CardDetails {
            card_number: "4111 1111 1111 1111".to_string(),
            expiry_date: "09/29".to_string(),
            cvv: "000".to_string(),
            card_holder_name: "Rahul Deshpande".to_string(),
        },
    )?;
    println!(
        "- Payment {} settled as {:?} (transaction {})",
        receipt.payment_id, receipt.status, receipt.transaction_id
    );
    let stats = market.payments.payment_stats(&owner)?;
    println!(
        "  Owner revenue {} across {} payments ({} failed)",
        stats.total_revenue, stats.total_payments, stats.failed
    );

    market.feedback.create(
        &tenant,
        FeedbackSubmission {
            property_id: listing.id.clone(),
            booking_id: Some(booking.id.clone()),
            rating: 4,
            comment: Some("Responsive owner, slightly noisy street".to_string()),
            categories: CategoryRatings {
                cleanliness: Some(5),
                location: Some(3),
                ..CategoryRatings::default()
            },
        },
    )?;
    let feedback = market.feedback.property_feedback(&listing.id)?;
    println!(
        "- Feedback: {} entries, average {:.1}",
        feedback.summary.count, feedback.summary.average_rating
    );
    for (category, average) in &feedback.summary.category_averages {
        println!("    - {:?}: {:.1}", category, average);
    }

    let report = market.moderation.submit_report(
        None,
        ReportSubmission {
            property_id: listing.id.clone(),
            category: "Misleading".to_string(),
            details: "Photos do not match the flat".to_string(),
        },
    )?;
    let outcome = market
        .moderation
        .review(&admin, &report.id, "Remove_Property")?;
    println!(
        "- Report {} reviewed: removed {} listing(s), {} booking(s), {} payment(s), {} feedback",
        outcome.report.id,
        outcome.removed.properties,
        outcome.removed.bookings,
        outcome.removed.payments,
        outcome.removed.feedback
    );

    Ok(())
}

pub(crate) fn parse_date(raw: &str) -> Result<NaiveDate, String> {
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map_err(|err| format!("failed to parse '{raw}' as YYYY-MM-DD ({err})"))
}
