//! Writing of finished images and displacement fields.

use byteorder::{BigEndian, LittleEndian, WriteBytesExt};
use ndarray::ArrayD;
use std::{
    fs,
    io::Write,
    path::Path,
};

use crate::{
    error::Result,
    io::{utils, Endianness},
    num::Floating,
};

/// Magic bytes opening every section of the native image format.
const SECTION_MAGIC: &[u8; 4] = b"WGIM";

/// Writer interface for finished images and displacement fields.
///
/// Writers are collaborators outside the operator-construction core: they
/// accept completed n-dimensional buffers together with a group/channel
/// label and persist them to their backing file format.
pub trait ImageWriter<F: Floating> {
    /// Writes an image under the given group name.
    fn write_image(&mut self, image: &ArrayD<F>, group_name: &str) -> Result<()>;

    /// Writes the per-dimension components of a displacement field under the
    /// given group name, one channel per component.
    fn write_displacement_field(
        &mut self,
        components: &[ArrayD<F>],
        group_name: &str,
    ) -> Result<()>;
}

/// Writes images to the native binary format.
///
/// Each written buffer becomes one section of the backing file: the section
/// magic, the group label, the shape, and the samples as 64-bit floats in
/// row-major order and the chosen byte order.
#[derive(Debug)]
pub struct NativeImageWriter {
    file: fs::File,
    endianness: Endianness,
}

impl NativeImageWriter {
    /// Creates a writer backed by the file at the given path, creating any
    /// missing parent directories first.
    pub fn new(file_path: &Path, endianness: Endianness) -> Result<Self> {
        utils::ensure_parent_directories(file_path)?;
        let file = fs::File::create(file_path)?;
        Ok(Self { file, endianness })
    }

    fn write_section<F: Floating>(&mut self, values: &ArrayD<F>, label: &str) -> Result<()> {
        self.file.write_all(SECTION_MAGIC)?;
        self.write_u32(label.len() as u32)?;
        self.file.write_all(label.as_bytes())?;
        self.write_u32(values.ndim() as u32)?;
        for &len in values.shape() {
            self.write_u64(len as u64)?;
        }
        for value in values.iter() {
            self.write_f64(value.to_f64().expect("Sample not representable as f64"))?;
        }
        Ok(())
    }

    fn write_u32(&mut self, value: u32) -> Result<()> {
        match self.endianness {
            Endianness::Little => self.file.write_u32::<LittleEndian>(value)?,
            Endianness::Big => self.file.write_u32::<BigEndian>(value)?,
        }
        Ok(())
    }

    fn write_u64(&mut self, value: u64) -> Result<()> {
        match self.endianness {
            Endianness::Little => self.file.write_u64::<LittleEndian>(value)?,
            Endianness::Big => self.file.write_u64::<BigEndian>(value)?,
        }
        Ok(())
    }

    fn write_f64(&mut self, value: f64) -> Result<()> {
        match self.endianness {
            Endianness::Little => self.file.write_f64::<LittleEndian>(value)?,
            Endianness::Big => self.file.write_f64::<BigEndian>(value)?,
        }
        Ok(())
    }
}

impl<F: Floating> ImageWriter<F> for NativeImageWriter {
    fn write_image(&mut self, image: &ArrayD<F>, group_name: &str) -> Result<()> {
        self.write_section(image, group_name)
    }

    fn write_displacement_field(
        &mut self,
        components: &[ArrayD<F>],
        group_name: &str,
    ) -> Result<()> {
        for (dim, component) in components.iter().enumerate() {
            self.write_section(component, &format!("{}{}", group_name, dim))?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {

    use super::*;
    use byteorder::ReadBytesExt;
    use ndarray::Array;
    use std::io::{Cursor, Read};

    struct SectionReader {
        cursor: Cursor<Vec<u8>>,
        endianness: Endianness,
    }

    struct Section {
        label: String,
        shape: Vec<usize>,
        values: Vec<f64>,
    }

    impl SectionReader {
        fn open(file_path: &Path, endianness: Endianness) -> Self {
            Self {
                cursor: Cursor::new(fs::read(file_path).unwrap()),
                endianness,
            }
        }

        fn read_u32(&mut self) -> u32 {
            match self.endianness {
                Endianness::Little => self.cursor.read_u32::<LittleEndian>().unwrap(),
                Endianness::Big => self.cursor.read_u32::<BigEndian>().unwrap(),
            }
        }

        fn read_section(&mut self) -> Section {
            let mut magic = [0; 4];
            self.cursor.read_exact(&mut magic).unwrap();
            assert_eq!(&magic, SECTION_MAGIC);

            let label_len = self.read_u32() as usize;
            let mut label = vec![0; label_len];
            self.cursor.read_exact(&mut label).unwrap();

            let ndim = self.read_u32() as usize;
            let shape: Vec<usize> = (0..ndim)
                .map(|_| {
                    let len = match self.endianness {
                        Endianness::Little => self.cursor.read_u64::<LittleEndian>().unwrap(),
                        Endianness::Big => self.cursor.read_u64::<BigEndian>().unwrap(),
                    };
                    len as usize
                })
                .collect();
            let values = (0..shape.iter().product::<usize>())
                .map(|_| match self.endianness {
                    Endianness::Little => self.cursor.read_f64::<LittleEndian>().unwrap(),
                    Endianness::Big => self.cursor.read_f64::<BigEndian>().unwrap(),
                })
                .collect();
            Section {
                label: String::from_utf8(label).unwrap(),
                shape,
                values,
            }
        }
    }

    #[test]
    fn written_image_sections_round_trip() {
        for endianness in [Endianness::Little, Endianness::Big] {
            let dir = tempfile::tempdir().unwrap();
            let file_path = dir.path().join("out").join("result.img");

            let image = Array::from_shape_vec(
                ndarray::IxDyn(&[2, 3]),
                vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0],
            )
            .unwrap();
            let mut writer = NativeImageWriter::new(&file_path, endianness).unwrap();
            writer.write_image(&image, "registered").unwrap();

            let mut reader = SectionReader::open(&file_path, endianness);
            let section = reader.read_section();
            assert_eq!(section.label, "registered");
            assert_eq!(section.shape, vec![2, 3]);
            assert_eq!(section.values, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
        }
    }

    #[test]
    fn displacement_components_are_written_as_numbered_channels() {
        let dir = tempfile::tempdir().unwrap();
        let file_path = dir.path().join("field.img");

        let components = [
            Array::from_elem(ndarray::IxDyn(&[4]), 0.5_f32),
            Array::from_elem(ndarray::IxDyn(&[4]), -0.5_f32),
        ];
        let mut writer = NativeImageWriter::new(&file_path, Endianness::Little).unwrap();
        writer
            .write_displacement_field(&components, "warp")
            .unwrap();

        let mut reader = SectionReader::open(&file_path, Endianness::Little);
        let first = reader.read_section();
        assert_eq!(first.label, "warp0");
        assert_eq!(first.values, vec![0.5; 4]);
        let second = reader.read_section();
        assert_eq!(second.label, "warp1");
        assert_eq!(second.values, vec![-0.5; 4]);
    }
}
