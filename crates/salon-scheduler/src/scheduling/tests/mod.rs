mod common;
mod slot_search;
