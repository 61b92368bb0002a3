mod common;

mod difficulty;
mod routing;
mod sanitizer;
