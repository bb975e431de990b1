pub mod alumni_list;
pub mod chat_area;
pub mod input_bar;
pub mod navbar;
pub mod toast_overlay;
