use image::{ImageFormat, Luma};
use qrcode::{EcLevel, QrCode};
use std::io::Cursor;

use crate::utils::GeneratorError;

/// 二维码最小边长 (像素)
pub const QR_SIZE: u32 = 256;

/// 将字符串编码为 PNG 格式二维码 (M 级纠错)
pub fn encode_png(data: &str) -> Result<Vec<u8>, GeneratorError> {
    let code = QrCode::with_error_correction_level(data.as_bytes(), EcLevel::M)
        .map_err(|e| GeneratorError::QrCode(e.to_string()))?;

    let image = code
        .render::<Luma<u8>>()
        .min_dimensions(QR_SIZE, QR_SIZE)
        .build();

    let mut png = Cursor::new(Vec::new());
    image
        .write_to(&mut png, ImageFormat::Png)
        .map_err(|e| GeneratorError::QrCode(e.to_string()))?;

    Ok(png.into_inner())
}
