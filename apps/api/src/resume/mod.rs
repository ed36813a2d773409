// Resume analyzer: scores a resume against a job description through the
// active provider. Stateless; nothing is kept between requests.

pub mod handlers;
pub mod scoring;
