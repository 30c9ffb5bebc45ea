mod common;

mod booking;
