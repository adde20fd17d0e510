pub mod gaussian_blur;
