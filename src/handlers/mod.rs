pub mod storable;
