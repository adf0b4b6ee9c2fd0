//! Built-in tour definitions.

use std::time::Duration;

use regex::Regex;
use tracing::error;

use super::guard::{ElementGuard, RouteGuard};
use super::model::{
    CarDetailStep, GuidedBookingStep, OwnerStep, RenterStep, ResponsiveOverride, RouteTrigger,
    StepAnchor, StepPosition, TourDefinition, TourId, TourStep, WelcomeStep,
};

/// Car detail pages, e.g. `/cars/123`.
pub const CAR_DETAIL_ROUTE: &str = r"^/cars/[^/?#]+/?(?:[?#].*)?$";
/// Booking detail pages, e.g. `/bookings/abc`.
pub const BOOKING_DETAIL_ROUTE: &str = r"^/bookings/[^/?#]+/?(?:[?#].*)?$";
/// Booking checkout, e.g. `/bookings/abc/checkout`.
pub const BOOKING_PAYMENT_ROUTE: &str = r"^/bookings/[^/?#]+/(?:checkout|payment)/?(?:[?#].*)?$";
/// The landing page and the car list, where the welcome tour may open.
pub const HOME_ROUTES: [&str; 2] = [r"^/(?:[?#].*)?$", r"^/cars/?(?:[?#].*)?$"];
/// Anywhere under the car list.
pub const CARS_AREA_ROUTE: &str = r"^/(?:cars(?:[/?#].*)?)?$";

/// Compile a built-in pattern. An invalid one is logged and left out.
fn compiled(pattern: &str) -> Option<Regex> {
    Regex::new(pattern)
        .map_err(|e| error!(pattern, error = %e, "Invalid built-in route pattern"))
        .ok()
}

fn route_guard(name: &str, pattern: &str) -> Option<RouteGuard> {
    RouteGuard::new(name, pattern)
        .map_err(|e| error!(guard = name, pattern, error = %e, "Invalid built-in guard pattern"))
        .ok()
}

/// All built-in tours, in picker order.
pub fn definitions() -> Vec<TourDefinition> {
    vec![welcome(), guided_booking(), renter(), owner(), car_detail()]
}

fn welcome() -> TourDefinition {
    TourDefinition::new(
        TourId::Welcome,
        "Welcome tour",
        "A quick look at the main features",
        vec![
            TourStep::new(
                WelcomeStep::Hero,
                "Welcome!",
                "We'll show you the main features in about 30 seconds.",
                StepPosition::Bottom,
                StepAnchor::marker("welcome-hero"),
            ),
            TourStep::new(
                WelcomeStep::Nav,
                "Main navigation",
                "Search cars, check your bookings and open your profile from here.",
                StepPosition::Bottom,
                StepAnchor::marker("welcome-nav"),
            ),
            TourStep::new(
                WelcomeStep::Help,
                "Help button",
                "Need help at any time? This button replays the guided tours.",
                StepPosition::Left,
                StepAnchor::marker("welcome-help"),
            ),
        ],
    )
    .with_cooldown(Duration::from_secs(168 * 60 * 60))
    .with_auto_start(HOME_ROUTES.into_iter().filter_map(compiled))
    .with_guards(route_guard("is-home-page", CARS_AREA_ROUTE))
}

fn guided_booking() -> TourDefinition {
    TourDefinition::new(
        TourId::GuidedBooking,
        "How to book a car",
        "Step-by-step guide to your first booking",
        vec![
            TourStep::new(
                GuidedBookingStep::Search,
                "Search cars",
                "Filter by location, dates, price and features. Results update on the map.",
                StepPosition::Right,
                StepAnchor::marker("guided-search"),
            )
            .with_route("/cars")
            .required()
            .with_mobile(ResponsiveOverride {
                position: Some(StepPosition::Bottom),
                text: Some("Use the filters to find the right car.".to_string()),
                anchor: None,
            }),
            TourStep::new(
                GuidedBookingStep::SelectCar,
                "Pick a car",
                "Browse nearby cars and tap a card to see the full details.",
                StepPosition::Top,
                StepAnchor::marker("guided-select-car"),
            )
            .with_mobile(ResponsiveOverride {
                position: Some(StepPosition::Bottom),
                text: None,
                anchor: Some(StepAnchor::selector(".map-carousel-mobile")),
            }),
            TourStep::new(
                GuidedBookingStep::Map,
                "Interactive map",
                "Every available car is on the map. Tap a marker or zoom to explore.",
                StepPosition::Bottom,
                StepAnchor::selector("#map-container"),
            ),
            TourStep::new(
                GuidedBookingStep::CarDetail,
                "Car details",
                "Photos, features, daily price, location, reviews and included insurance.",
                StepPosition::Top,
                StepAnchor::marker("car-detail-gallery"),
            ),
            TourStep::new(
                GuidedBookingStep::Dates,
                "Dates and times",
                "Choose start and end dates; the total updates automatically.",
                StepPosition::Left,
                StepAnchor::marker("booking-dates"),
            ),
            TourStep::new(
                GuidedBookingStep::Price,
                "Price breakdown",
                "Daily cost, insurance, platform fee and total. No surprises.",
                StepPosition::Left,
                StepAnchor::marker("price-breakdown"),
            ),
            TourStep::new(
                GuidedBookingStep::BookButton,
                "Book",
                "All set? Press Book to continue to payment.",
                StepPosition::Bottom,
                StepAnchor::marker("book-button"),
            ),
            TourStep::new(
                GuidedBookingStep::BookingDetail,
                "Booking confirmation",
                "Car, dates, price and status of your booking live here.",
                StepPosition::Top,
                StepAnchor::marker("booking-summary"),
            ),
            TourStep::new(
                GuidedBookingStep::Chat,
                "Chat with the owner",
                "Agree on the pickup spot, ask questions or send documents.",
                StepPosition::Left,
                StepAnchor::marker("booking-chat"),
            ),
            TourStep::new(
                GuidedBookingStep::Payment,
                "Secure payment",
                "The amount is held until you pick up the car.",
                StepPosition::Top,
                StepAnchor::marker("payment-section"),
            ),
        ],
    )
    .with_terminal_label("Got it! 🎉")
    .with_cooldown(Duration::from_secs(72 * 60 * 60))
    .with_triggers(
        [
            (CAR_DETAIL_ROUTE, GuidedBookingStep::CarDetail),
            (BOOKING_DETAIL_ROUTE, GuidedBookingStep::BookingDetail),
            (BOOKING_PAYMENT_ROUTE, GuidedBookingStep::Payment),
        ]
        .into_iter()
        .filter_map(|(pattern, step)| {
            compiled(pattern).map(|pattern| RouteTrigger {
                pattern,
                step: step.into(),
            })
        }),
    )
    .with_guard(ElementGuard::new(
        "has-inventory",
        StepAnchor::marker("guided-select-car"),
    ))
    .with_guards(route_guard("is-on-cars-page", CARS_AREA_ROUTE))
}

fn renter() -> TourDefinition {
    TourDefinition::new(
        TourId::Renter,
        "Renter tour",
        "Learn how to search for and rent cars",
        vec![
            TourStep::new(
                RenterStep::Search,
                "Smart search",
                "Search by location, dates or car type. Every vehicle is verified.",
                StepPosition::Bottom,
                StepAnchor::selector("#search-input, .search-bar"),
            ),
            TourStep::new(
                RenterStep::Filters,
                "Quick filters",
                "Filter by price, car type or rating in seconds.",
                StepPosition::Right,
                StepAnchor::selector(".filter-section, #filters"),
            ),
            TourStep::new(
                RenterStep::Map,
                "Map view",
                "See available cars near you in real time.",
                StepPosition::Left,
                StepAnchor::selector("#map-container, .map-view"),
            ),
            TourStep::new(
                RenterStep::Card,
                "Full transparency",
                "Real photos, verified reviews and clear conditions before you book.",
                StepPosition::Top,
                StepAnchor::selector(".car-card:first-of-type"),
            ),
        ],
    )
}

fn owner() -> TourDefinition {
    TourDefinition::new(
        TourId::Owner,
        "Publish your car",
        "Earn money renting out your vehicle",
        vec![
            TourStep::new(
                OwnerStep::Publish,
                "Turn your car into income",
                "Publishing takes about three minutes.",
                StepPosition::Right,
                StepAnchor::selector("#publish-car, .publish-button"),
            ),
            TourStep::new(
                OwnerStep::Photos,
                "Photos matter",
                "Good photos bring noticeably more bookings.",
                StepPosition::Bottom,
                StepAnchor::selector("#photo-uploader, .upload-section"),
            ),
            TourStep::new(
                OwnerStep::Pricing,
                "Smart pricing",
                "We suggest a price based on area and demand. Adjust it any time.",
                StepPosition::Left,
                StepAnchor::selector("#pricing-section, .price-input"),
            ),
            TourStep::new(
                OwnerStep::Insurance,
                "Insurance included",
                "Theft, damage and roadside assistance coverage.",
                StepPosition::Right,
                StepAnchor::selector("#insurance-selector, .insurance-section"),
            ),
            TourStep::new(
                OwnerStep::Calendar,
                "Availability",
                "Block the dates you need the car yourself.",
                StepPosition::Top,
                StepAnchor::selector("#availability-calendar, .calendar-section"),
            ),
            TourStep::new(
                OwnerStep::PublishButton,
                "Ready to publish",
                "Once published you show up in search. Pause or edit for free.",
                StepPosition::Left,
                StepAnchor::selector("#publish-button, [type=\"submit\"]"),
            ),
        ],
    )
}

fn car_detail() -> TourDefinition {
    TourDefinition::new(
        TourId::CarDetail,
        "Car details",
        "Everything about the vehicle at a glance",
        vec![
            TourStep::new(
                CarDetailStep::Gallery,
                "Photo gallery",
                "Tap to see every photo in detail.",
                StepPosition::Bottom,
                StepAnchor::selector(".car-gallery, .image-carousel"),
            ),
            TourStep::new(
                CarDetailStep::Reviews,
                "Verified reviews",
                "Only people who rented the car can review it.",
                StepPosition::Top,
                StepAnchor::selector(".reviews-section, #reviews"),
            ),
            TourStep::new(
                CarDetailStep::Insurance,
                "Insurance and terms",
                "Insurance, deposit and cancellation policy, all upfront.",
                StepPosition::Right,
                StepAnchor::selector(".insurance-info, #insurance"),
            ),
            TourStep::new(
                CarDetailStep::Book,
                "Safe booking",
                "Protected payment and instant confirmation.",
                StepPosition::Left,
                StepAnchor::selector("#book-now, .book-button"),
            ),
        ],
    )
}
