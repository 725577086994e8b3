//! # FITS 协作者与读取算法
//!
//! ## 设计思路
//!
//! FITS 库只通过窄接口被调用：只读打开、读取图像参数、按行读取 f64 采样、关闭。
//! 失败统一携带 cfitsio 编号风格的状态码，由桥接层映射为 `CodecError`。
//! 读取算法（`read_fits_with`）与具体库实现解耦，便于测试注入假数据源。
//!
//! ## 实现思路
//!
//! - 读取：自最后一行向第一行逐行读取，文件第 k 行写入第 k - 1 个存储行，
//!   存储顺序与文件顺序一致；同时追踪全图最小 / 最大值作为显示亮度范围；所有采样统一存为 f64。
//! - 分配位图前先按 `FitsLimits` 校验轴长度与内存需求。
//! - 任何打开 / 参数 / 读取失败都先关闭文件句柄再向上传播。
//! - `FitsFile`：基于 `fitsio-pure` 解析主 HDU，打开时确认数据区完整，
//!   读取时应用 BSCALE / BZERO。
//! - 写入同样按存储顺序输出，保证写后再读得到同一幅图。

use std::path::Path;

use fitsio_pure::hdu::{parse_fits, Hdu, HduInfo};
use fitsio_pure::image::{
    apply_bscale_bzero, build_image_hdu_with_scaling, bytes_per_pixel, extract_bscale_bzero,
    image_dimensions, read_image_rows, read_image_section,
};

use super::{CodecConfig, RasterFrame};
use crate::bitmap::Bitmap;
use crate::error::{Result, ToolError};
use crate::sample::Depth;

/// cfitsio 兼容的状态码。
pub mod status {
    pub const FILE_NOT_OPENED: i32 = 104;
    pub const FILE_NOT_CREATED: i32 = 105;
    pub const END_OF_FILE: i32 = 107;
    pub const READ_ERROR: i32 = 108;
    pub const BAD_BITPIX: i32 = 211;
    pub const BAD_NAXIS: i32 = 212;
    pub const BAD_NAXES: i32 = 213;
    pub const NO_SIMPLE: i32 = 221;
    pub const BAD_PIX_NUM: i32 = 321;
}

/// FITS 库报告的失败。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FitsStatus {
    pub code: i32,
    pub message: String,
}

impl FitsStatus {
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

pub(crate) fn codec_error(status: FitsStatus) -> ToolError {
    ToolError::Codec {
        library: "fits",
        status: status.code,
        message: status.message,
    }
}

/// 图像参数（仅前两个轴；缺省轴长度为 1）。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitsImageParams {
    pub bitpix: i64,
    pub naxis: i64,
    pub naxes: [usize; 2],
}

/// 已只读打开的 FITS 图像。
pub trait FitsSource {
    fn image_params(&mut self) -> Result<FitsImageParams, FitsStatus>;

    /// 读取第 `row` 行（从 1 开始，与 FITS 像素坐标一致），`out.len()` 为行宽。
    fn read_row(&mut self, row: usize, out: &mut [f64]) -> Result<(), FitsStatus>;

    fn close(self) -> Result<(), FitsStatus>;
}

/// FITS 协作者。
pub trait FitsCodec {
    type Source: FitsSource;

    /// 读取时允许的最大尺寸。
    fn limits(&self) -> FitsLimits;

    fn open_read_only(&self, path: &Path) -> Result<Self::Source, FitsStatus>;

    /// 写入单通道整型图像。
    fn write_image(&self, frame: RasterFrame<'_>, path: &Path) -> Result<(), FitsStatus>;
}

/// 关闭句柄后返回原始错误；关闭本身的失败只记日志。
fn close_then<S: FitsSource>(source: S, error: ToolError) -> ToolError {
    if let Err(close_status) = source.close() {
        log::warn!("⚠️ 关闭 FITS 文件失败（状态码 {}）: {}", close_status.code, close_status.message);
    }
    error
}

/// 以 FITS 协作者读取图像为 f64 位图。
pub fn read_fits_with<F: FitsCodec + ?Sized>(fits: &F, path: &Path) -> Result<Bitmap> {
    let mut source = fits.open_read_only(path).map_err(codec_error)?;

    let params = match source.image_params() {
        Ok(params) => params,
        Err(status) => return Err(close_then(source, codec_error(status))),
    };

    if params.naxis == 0 || params.naxis > 2 {
        return Err(close_then(source, ToolError::UnsupportedDimensionality(params.naxis)));
    }

    let [width, height] = params.naxes;
    if let Err(status) = fits.limits().check(width, height) {
        return Err(close_then(source, codec_error(status)));
    }

    let mut bitmap = match Bitmap::new(width, height, 1, Depth::F64) {
        Ok(bitmap) => bitmap,
        Err(err) => return Err(close_then(source, err)),
    };

    log::info!(
        "🔭 读取 FITS - 路径: {} 尺寸: {}x{} BITPIX: {}",
        path.display(),
        width,
        height,
        params.bitpix
    );

    let mut row = vec![0f64; width];
    let mut min = f64::MAX;
    let mut max = f64::MIN;

    let Some(samples) = bitmap.samples_mut::<f64>() else {
        return Err(close_then(
            source,
            ToolError::InvalidBuffer("FITS 位图缓冲类型异常".to_string()),
        ));
    };

    for file_row in (1..=height).rev() {
        if let Err(status) = source.read_row(file_row, &mut row) {
            return Err(close_then(source, codec_error(status)));
        }

        let target = file_row - 1;
        let dst = &mut samples[target * width..(target + 1) * width];
        for (slot, &value) in dst.iter_mut().zip(&row) {
            max = max.max(value);
            min = min.min(value);
            *slot = value;
        }
    }

    source.close().map_err(codec_error)?;
    bitmap.set_brightness_range(min, max);

    Ok(bitmap)
}

/// 读取阶段的尺寸与内存上限。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FitsLimits {
    pub max_width: usize,
    pub max_height: usize,
    pub max_alloc_bytes: u64,
}

impl FitsLimits {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            max_width: config.max_image_width as usize,
            max_height: config.max_image_height as usize,
            max_alloc_bytes: config.max_alloc_bytes,
        }
    }

    /// 在分配位图之前校验轴长度与 f64 存储大小。
    fn check(&self, width: usize, height: usize) -> Result<(), FitsStatus> {
        if width > self.max_width || height > self.max_height {
            return Err(FitsStatus::new(
                status::BAD_NAXES,
                format!(
                    "图像尺寸 {}x{} 超出上限 {}x{}",
                    width, height, self.max_width, self.max_height
                ),
            ));
        }

        let bytes = (width as u64)
            .checked_mul(height as u64)
            .and_then(|pixels| pixels.checked_mul(Depth::F64.byte_size() as u64));
        match bytes {
            Some(bytes) if bytes <= self.max_alloc_bytes => Ok(()),
            _ => Err(FitsStatus::new(
                status::BAD_NAXES,
                format!("图像 {}x{} 需要的内存超出上限 {} 字节", width, height, self.max_alloc_bytes),
            )),
        }
    }
}

impl Default for FitsLimits {
    fn default() -> Self {
        Self::new(&CodecConfig::default())
    }
}

/// 默认 FITS 协作者：基于 `fitsio-pure` 的主 HDU 读写。
#[derive(Debug, Clone, Copy, Default)]
pub struct FitsLibrary {
    limits: FitsLimits,
}

impl FitsLibrary {
    pub fn new(config: &CodecConfig) -> Self {
        Self {
            limits: FitsLimits::new(config),
        }
    }
}

impl FitsCodec for FitsLibrary {
    type Source = FitsFile;

    fn limits(&self) -> FitsLimits {
        self.limits
    }

    fn open_read_only(&self, path: &Path) -> Result<FitsFile, FitsStatus> {
        FitsFile::open(path)
    }

    fn write_image(&self, frame: RasterFrame<'_>, path: &Path) -> Result<(), FitsStatus> {
        write_primary_image(frame, path)
    }
}

/// `fitsio-pure` 错误 → cfitsio 风格状态码。
fn library_status(error: fitsio_pure::Error) -> FitsStatus {
    let code = match &error {
        fitsio_pure::Error::UnexpectedEof => status::END_OF_FILE,
        fitsio_pure::Error::InvalidBitpix(_) => status::BAD_BITPIX,
        fitsio_pure::Error::InvalidValue => status::BAD_PIX_NUM,
        fitsio_pure::Error::InvalidHeader(_) => status::NO_SIMPLE,
        _ => status::READ_ERROR,
    };
    FitsStatus::new(code, format!("{:?}", error))
}

/// 已解析主 HDU 的 FITS 文件（整个文件驻留内存）。
pub struct FitsFile {
    bytes: Vec<u8>,
    hdu: Hdu,
    params: FitsImageParams,
    bscale: f64,
    bzero: f64,
}

impl FitsFile {
    pub fn open(path: &Path) -> Result<Self, FitsStatus> {
        let bytes = std::fs::read(path).map_err(|e| {
            FitsStatus::new(status::FILE_NOT_OPENED, format!("无法打开 '{}': {}", path.display(), e))
        })?;

        let hdu = parse_fits(&bytes)
            .map_err(library_status)?
            .hdus
            .into_iter()
            .next()
            .ok_or_else(|| FitsStatus::new(status::NO_SIMPLE, "文件中没有 HDU"))?;

        let bitpix = match &hdu.info {
            HduInfo::Primary { bitpix, .. } => *bitpix,
            _ => return Err(FitsStatus::new(status::NO_SIMPLE, "首个 HDU 不是主图像")),
        };
        let naxes = image_dimensions(&hdu).map_err(library_status)?;

        // 头部声明的数据区必须完整存在于文件中
        let declared = naxes
            .iter()
            .try_fold(bytes_per_pixel(bitpix).map_err(library_status)?, |acc, &axis| {
                acc.checked_mul(axis)
            })
            .and_then(|len| len.checked_add(hdu.data_start))
            .ok_or_else(|| FitsStatus::new(status::BAD_NAXES, "数据区长度溢出"))?;
        if !naxes.is_empty() && declared > bytes.len() {
            return Err(FitsStatus::new(
                status::END_OF_FILE,
                format!("数据区不完整：头部声明到 {} 字节，文件只有 {} 字节", declared, bytes.len()),
            ));
        }

        let mut axes = [1usize; 2];
        for (slot, &length) in axes.iter_mut().zip(&naxes) {
            *slot = length;
        }

        let (bscale, bzero) = extract_bscale_bzero(&hdu.cards);

        Ok(Self {
            bytes,
            hdu,
            params: FitsImageParams {
                bitpix,
                naxis: naxes.len() as i64,
                naxes: axes,
            },
            bscale,
            bzero,
        })
    }
}

impl FitsSource for FitsFile {
    fn image_params(&mut self) -> Result<FitsImageParams, FitsStatus> {
        Ok(self.params)
    }

    fn read_row(&mut self, row: usize, out: &mut [f64]) -> Result<(), FitsStatus> {
        let [width, height] = self.params.naxes;
        if row == 0 || row > height || out.len() != width {
            return Err(FitsStatus::new(
                status::BAD_PIX_NUM,
                format!("行号 {} 越界（共 {} 行，宽 {}）", row, height, width),
            ));
        }

        let raw = if self.params.naxis >= 2 {
            read_image_rows(&self.bytes, &self.hdu, row - 1, 1)
        } else {
            read_image_section(&self.bytes, &self.hdu, 0, width)
        }
        .map_err(library_status)?;

        let physical = apply_bscale_bzero(&raw, self.bscale, self.bzero);
        if physical.len() != width {
            return Err(FitsStatus::new(
                status::READ_ERROR,
                format!("第 {} 行只读到 {} 个采样", row, physical.len()),
            ));
        }
        out.copy_from_slice(&physical);

        Ok(())
    }

    fn close(self) -> Result<(), FitsStatus> {
        drop(self.bytes);
        Ok(())
    }
}

/// 写入单通道 8 / 16 / 32 位无符号图像到主 HDU。
///
/// 16 / 32 位按 FITS 惯例以有符号整数 + BZERO 偏移存储。
fn write_primary_image(frame: RasterFrame<'_>, path: &Path) -> Result<(), FitsStatus> {
    if frame.channels != 1 {
        return Err(FitsStatus::new(
            status::BAD_NAXIS,
            format!("FITS 仅支持单通道写入，实际 {} 通道", frame.channels),
        ));
    }

    let (bitpix, bzero, physical): (i64, f64, Vec<f64>) = match frame.depth {
        Depth::U8 => (8, 0.0, frame.bytes.iter().map(|&v| f64::from(v)).collect()),
        Depth::U16 => {
            let samples: Vec<u16> = bytemuck::pod_collect_to_vec(frame.bytes);
            (16, 32_768.0, samples.into_iter().map(f64::from).collect())
        }
        Depth::U32 => {
            let samples: Vec<u32> = bytemuck::pod_collect_to_vec(frame.bytes);
            (32, 2_147_483_648.0, samples.into_iter().map(f64::from).collect())
        }
        other => {
            return Err(FitsStatus::new(
                status::BAD_BITPIX,
                format!("不支持写入深度 {} 的 FITS 图像", other),
            ));
        }
    };

    // 存储行按自然顺序写出：第 1 个存储行即文件第 1 行
    let hdu = build_image_hdu_with_scaling(bitpix, &[frame.width, frame.height], &physical, 1.0, bzero)
        .map_err(library_status)?;

    std::fs::write(path, hdu).map_err(|e| {
        FitsStatus::new(status::FILE_NOT_CREATED, format!("无法写入 '{}': {}", path.display(), e))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use fitsio_pure::header::serialize_header;
    use fitsio_pure::image::{build_image_hdu, ImageData};
    use fitsio_pure::primary::build_primary_header;
    use std::cell::RefCell;
    use std::rc::Rc;

    /// 生成 BITPIX = -64 的测试文件；`values` 按文件存储顺序排列。
    fn write_f64_fits(path: &Path, naxes: &[usize], values: &[f64]) {
        let bytes = build_image_hdu(-64, naxes, &ImageData::F64(values.to_vec())).expect("build hdu");
        std::fs::write(path, bytes).expect("write fits fixture");
    }

    #[test]
    fn single_row_image_keeps_row_and_tracks_range() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("row.fits");
        write_f64_fits(&path, &[3, 1], &[1.0, 2.0, 3.0]);

        let bitmap = read_fits_with(&FitsLibrary::default(), &path).expect("read fits");
        assert_eq!((bitmap.width(), bitmap.height(), bitmap.channels()), (3, 1, 1));
        assert_eq!(bitmap.depth(), Depth::F64);
        assert_eq!(bitmap.samples::<f64>(), Some(&[1.0, 2.0, 3.0][..]));
        assert_eq!(bitmap.brightness_range(), (1.0, 3.0));
    }

    #[test]
    fn one_dimensional_image_has_height_one() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("line.fits");
        write_f64_fits(&path, &[4], &[4.0, -1.0, 0.5, 2.0]);

        let bitmap = read_fits_with(&FitsLibrary::default(), &path).expect("read fits");
        assert_eq!((bitmap.width(), bitmap.height()), (4, 1));
        assert_eq!(bitmap.samples::<f64>(), Some(&[4.0, -1.0, 0.5, 2.0][..]));
        assert_eq!(bitmap.brightness_range(), (-1.0, 4.0));
    }

    #[test]
    fn file_rows_keep_their_storage_order() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rows.fits");
        write_f64_fits(&path, &[2, 3], &[1.0, 1.5, 2.0, 2.5, 3.0, 3.5]);

        let bitmap = read_fits_with(&FitsLibrary::default(), &path).expect("read fits");
        assert_eq!(
            bitmap.samples::<f64>(),
            Some(&[1.0, 1.5, 2.0, 2.5, 3.0, 3.5][..])
        );
    }

    #[test]
    fn three_dimensional_image_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("cube.fits");
        write_f64_fits(&path, &[1, 1, 2], &[1.0, 2.0]);

        assert!(matches!(
            read_fits_with(&FitsLibrary::default(), &path),
            Err(ToolError::UnsupportedDimensionality(3))
        ));
    }

    #[test]
    fn garbage_file_reports_codec_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("garbage.fits");
        std::fs::write(&path, vec![b'x'; fitsio_pure::BLOCK_SIZE]).expect("write garbage");

        match read_fits_with(&FitsLibrary::default(), &path) {
            Err(ToolError::Codec { library, status: code, .. }) => {
                assert_eq!(library, "fits");
                assert!(code > 0);
            }
            other => panic!("unexpected result: {other:?}"),
        }
    }

    #[test]
    fn header_claiming_more_data_than_the_file_holds_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("truncated.fits");
        let cards = build_primary_header(-64, &[60_000, 60_000]).expect("header cards");
        let mut bytes = serialize_header(&cards).expect("serialize header");
        bytes.resize(bytes.len() + fitsio_pure::BLOCK_SIZE, 0);
        std::fs::write(&path, bytes).expect("write fits");

        assert!(matches!(
            read_fits_with(&FitsLibrary::default(), &path),
            Err(ToolError::Codec { library: "fits", .. })
        ));
    }

    #[test]
    fn image_larger_than_configured_limits_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("wide.fits");
        write_f64_fits(&path, &[3, 1], &[1.0, 2.0, 3.0]);

        let narrow = FitsLibrary::new(&CodecConfig {
            max_image_width: 2,
            ..CodecConfig::default()
        });
        assert!(matches!(
            read_fits_with(&narrow, &path),
            Err(ToolError::Codec { status: status::BAD_NAXES, .. })
        ));
    }

    #[test]
    fn bscale_and_bzero_are_applied() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("scaled.fits");
        // 原始值 -3、5，物理值 = 10 + 2 * 原始值
        let bytes = build_image_hdu_with_scaling(16, &[2], &[4.0, 20.0], 2.0, 10.0).expect("build hdu");
        std::fs::write(&path, bytes).expect("write fits");

        let bitmap = read_fits_with(&FitsLibrary::default(), &path).expect("read fits");
        assert_eq!(bitmap.samples::<f64>(), Some(&[4.0, 20.0][..]));
    }

    #[test]
    fn written_images_read_back_identically() {
        let dir = tempfile::tempdir().expect("tempdir");
        let fits = FitsLibrary::default();

        let u16_bitmap = Bitmap::from_samples(2, 2, 1, &[0u16, 1, 40000, 65535]).expect("bitmap");
        let path = dir.path().join("u16.fits");
        fits.write_image(RasterFrame::from(&u16_bitmap), &path).expect("write");
        let read = read_fits_with(&fits, &path).expect("read");
        assert_eq!(read.samples::<f64>(), Some(&[0.0, 1.0, 40000.0, 65535.0][..]));

        let u32_bitmap = Bitmap::from_samples(3, 1, 1, &[7u32, u32::MAX, 0]).expect("bitmap");
        let path = dir.path().join("u32.fit");
        fits.write_image(RasterFrame::from(&u32_bitmap), &path).expect("write");
        let read = read_fits_with(&fits, &path).expect("read");
        assert_eq!(read.samples::<f64>(), Some(&[7.0, u32::MAX as f64, 0.0][..]));
        assert_eq!(read.brightness_range(), (0.0, u32::MAX as f64));
    }

    /// 记录关闭次数、在指定行失败的假数据源。
    struct FakeSource {
        params: FitsImageParams,
        fail_at_row: Option<usize>,
        rows_read: Rc<RefCell<Vec<usize>>>,
        closed: Rc<RefCell<u32>>,
    }

    impl FitsSource for FakeSource {
        fn image_params(&mut self) -> Result<FitsImageParams, FitsStatus> {
            Ok(self.params)
        }

        fn read_row(&mut self, row: usize, out: &mut [f64]) -> Result<(), FitsStatus> {
            self.rows_read.borrow_mut().push(row);
            if self.fail_at_row == Some(row) {
                return Err(FitsStatus::new(status::READ_ERROR, "simulated"));
            }
            out.fill(row as f64);
            Ok(())
        }

        fn close(self) -> Result<(), FitsStatus> {
            *self.closed.borrow_mut() += 1;
            Ok(())
        }
    }

    struct FakeFits {
        naxis: i64,
        naxes: [usize; 2],
        fail_at_row: Option<usize>,
        rows_read: Rc<RefCell<Vec<usize>>>,
        closed: Rc<RefCell<u32>>,
    }

    impl FakeFits {
        fn new(naxis: i64, fail_at_row: Option<usize>) -> Self {
            Self {
                naxis,
                naxes: [2, 3],
                fail_at_row,
                rows_read: Rc::default(),
                closed: Rc::default(),
            }
        }
    }

    impl FitsCodec for FakeFits {
        type Source = FakeSource;

        fn limits(&self) -> FitsLimits {
            FitsLimits::default()
        }

        fn open_read_only(&self, _path: &Path) -> Result<FakeSource, FitsStatus> {
            Ok(FakeSource {
                params: FitsImageParams {
                    bitpix: -64,
                    naxis: self.naxis,
                    naxes: self.naxes,
                },
                fail_at_row: self.fail_at_row,
                rows_read: Rc::clone(&self.rows_read),
                closed: Rc::clone(&self.closed),
            })
        }

        fn write_image(&self, _frame: RasterFrame<'_>, _path: &Path) -> Result<(), FitsStatus> {
            Ok(())
        }
    }

    #[test]
    fn rows_are_read_from_last_to_first() {
        let fits = FakeFits::new(2, None);
        let bitmap = read_fits_with(&fits, Path::new("fake.fits")).expect("read");

        assert_eq!(*fits.rows_read.borrow(), vec![3, 2, 1]);
        assert_eq!(*fits.closed.borrow(), 1);
        // 第 k 行落在第 k - 1 个存储行
        assert_eq!(
            bitmap.samples::<f64>(),
            Some(&[1.0, 1.0, 2.0, 2.0, 3.0, 3.0][..])
        );
    }

    #[test]
    fn oversized_axes_are_rejected_before_any_row_is_read() {
        let mut fits = FakeFits::new(2, None);
        fits.naxes = [1 << 20, 1 << 20];
        let result = read_fits_with(&fits, Path::new("huge.fits"));

        assert!(matches!(
            result,
            Err(ToolError::Codec { status: status::BAD_NAXES, .. })
        ));
        assert!(fits.rows_read.borrow().is_empty());
        assert_eq!(*fits.closed.borrow(), 1);
    }

    #[test]
    fn read_failure_closes_handle_before_propagating() {
        let fits = FakeFits::new(2, Some(2));
        let result = read_fits_with(&fits, Path::new("fake.fits"));

        assert!(matches!(
            result,
            Err(ToolError::Codec { status: status::READ_ERROR, .. })
        ));
        assert_eq!(*fits.closed.borrow(), 1);
    }

    #[test]
    fn unsupported_dimensionality_closes_handle() {
        let fits = FakeFits::new(0, None);
        let result = read_fits_with(&fits, Path::new("fake.fits"));

        assert!(matches!(result, Err(ToolError::UnsupportedDimensionality(0))));
        assert_eq!(*fits.closed.borrow(), 1);
    }
}
