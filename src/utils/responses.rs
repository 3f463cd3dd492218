//! Redirect responses used by the login endpoints

use actix_web::{cookie::Cookie, http::header, HttpResponse};

pub struct ResponseBuilder;

impl ResponseBuilder {
    /// Create a redirect response (302 Found) with optional cookies
    #[must_use]
    pub fn redirect(location: &str) -> RedirectBuilder {
        RedirectBuilder::new(location)
    }
}

/// Builder for redirect responses
pub struct RedirectBuilder {
    location: String,
    cookies: Vec<Cookie<'static>>,
    permanent: bool,
}

impl RedirectBuilder {
    fn new(location: &str) -> Self {
        Self {
            location: location.to_string(),
            cookies: Vec::new(),
            permanent: false,
        }
    }

    #[must_use]
    pub fn with_cookie(mut self, cookie: Cookie<'static>) -> Self {
        self.cookies.push(cookie);
        self
    }

    /// Use 301 Moved Permanently instead of 302 Found
    #[must_use]
    pub fn permanent(mut self) -> Self {
        self.permanent = true;
        self
    }

    #[must_use]
    pub fn build(self) -> HttpResponse {
        let mut builder = if self.permanent {
            HttpResponse::MovedPermanently()
        } else {
            HttpResponse::Found()
        };

        for cookie in self.cookies {
            builder.cookie(cookie);
        }

        builder
            .insert_header((header::LOCATION, self.location))
            .finish()
    }
}
