pub mod culture_portal;
pub mod tour_api;

pub use culture_portal::CulturePortalApi;
pub use tour_api::TourApi;
