pub mod area_resampler;
pub mod face_detector;
pub mod face_region;
pub mod region_extractor;
