use std::convert::Infallible;

use rocket::request::{FromRequest, Outcome, Request};

pub const DEFAULT_PAGE_LENGTH: u32 = 20;

#[derive(Debug, Copy, Clone, Eq, PartialEq, Hash)]
pub struct PageState {
    pub page_length: u32,
    pub page: u32,
}

impl Default for PageState {
    fn default() -> Self {
        PageState {
            page_length: DEFAULT_PAGE_LENGTH,
            page: 0,
        }
    }
}

impl PageState {
    /// Items of the requested page, in the order they were listed.
    pub fn apply<T>(&self, items: Vec<T>) -> Vec<T> {
        let skip = self.page as usize * self.page_length as usize;
        items
            .into_iter()
            .skip(skip)
            .take(self.page_length as usize)
            .collect()
    }
}

#[rocket::async_trait]
impl<'r> FromRequest<'r> for PageState {
    type Error = Infallible;

    async fn from_request(request: &'r Request<'_>) -> Outcome<Self, Self::Error> {
        let length: Option<u32> = request
            .query_value("len")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("l").and_then(|it| it.ok()))
            .filter(|it| *it > 0);

        let page: Option<u32> = request
            .query_value("page")
            .and_then(|it| it.ok())
            .or_else(|| request.query_value("p").and_then(|it| it.ok()));

        Outcome::Success(PageState {
            page_length: length.unwrap_or(DEFAULT_PAGE_LENGTH),
            page: page.unwrap_or(0),
        })
    }
}
