//! STL import, binary and ASCII
//!
//! Facets are read as loose triangles and welded into an indexed [`Mesh`].
//! Stored facet normals are ignored; normals are rebuilt from the winding.
use nalgebra::Point3;
use nom::{
    bytes::complete::tag,
    character::complete::{multispace0, multispace1, not_line_ending},
    multi::many0,
    number::complete::float,
    sequence::{preceded, tuple},
    IResult,
};

use crate::error::StlError;
use crate::mesh::{Mesh, Triangle};

const HEADER_LEN: usize = 80;
const FACET_LEN: usize = 50;

/// Parse a binary STL file
pub fn parse_binary_stl(data: &[u8]) -> Result<Mesh, StlError> {
    if data.len() < HEADER_LEN + 4 {
        return Err(StlError::TooSmall(data.len()));
    }

    let count = u32::from_le_bytes([data[80], data[81], data[82], data[83]]) as usize;
    let body = &data[HEADER_LEN + 4..];

    let found = body.len() / FACET_LEN;
    if found < count {
        return Err(StlError::Truncated {
            expected: count,
            found,
        });
    }

    let triangles: Vec<Triangle> = body
        .chunks_exact(FACET_LEN)
        .take(count)
        .map(|facet| {
            // 12 bytes of normal, then three vertices, then 2 attribute bytes
            let vertex = |i: usize| {
                let at = 12 + i * 12;
                Point3::new(
                    read_f32(facet, at),
                    read_f32(facet, at + 4),
                    read_f32(facet, at + 8),
                )
            };
            Triangle::new(vertex(0), vertex(1), vertex(2))
        })
        .collect();

    Ok(Mesh::from_triangles(&triangles))
}

fn read_f32(bytes: &[u8], at: usize) -> f32 {
    f32::from_le_bytes([bytes[at], bytes[at + 1], bytes[at + 2], bytes[at + 3]])
}

/// Parse an ASCII STL document
pub fn parse_ascii_stl(input: &str) -> Result<Mesh, StlError> {
    match solid(input) {
        Ok((_, triangles)) => Ok(Mesh::from_triangles(&triangles)),
        Err(e) => Err(StlError::Ascii(e.to_string())),
    }
}

pub fn parse_ascii_stl_bytes(data: &[u8]) -> Result<Mesh, StlError> {
    let text = std::str::from_utf8(data).map_err(|_| StlError::InvalidUtf8)?;
    parse_ascii_stl(text)
}

fn solid(input: &str) -> IResult<&str, Vec<Triangle>> {
    let (input, _) = preceded(multispace0, tag("solid"))(input)?;
    let (input, _name) = not_line_ending(input)?;
    let (input, triangles) = many0(facet)(input)?;
    let (input, _) = preceded(multispace0, tag("endsolid"))(input)?;
    let (input, _) = not_line_ending(input)?;
    Ok((input, triangles))
}

fn facet(input: &str) -> IResult<&str, Triangle> {
    let (input, _) = preceded(multispace0, tag("facet"))(input)?;
    let (input, _) = preceded(multispace1, tag("normal"))(input)?;
    let (input, _normal) = vector3(input)?;
    let (input, _) = preceded(multispace0, tag("outer"))(input)?;
    let (input, _) = preceded(multispace1, tag("loop"))(input)?;
    let (input, (v0, v1, v2)) = tuple((vertex, vertex, vertex))(input)?;
    let (input, _) = preceded(multispace0, tag("endloop"))(input)?;
    let (input, _) = preceded(multispace0, tag("endfacet"))(input)?;

    Ok((input, Triangle::new(v0, v1, v2)))
}

fn vertex(input: &str) -> IResult<&str, Point3<f32>> {
    let (input, _) = preceded(multispace0, tag("vertex"))(input)?;
    let (input, (x, y, z)) = vector3(input)?;
    Ok((input, Point3::new(x, y, z)))
}

fn vector3(input: &str) -> IResult<&str, (f32, f32, f32)> {
    let (input, _) = multispace0(input)?;
    let (input, x) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, y) = float(input)?;
    let (input, _) = multispace1(input)?;
    let (input, z) = float(input)?;
    Ok((input, (x, y, z)))
}

/// Detect and parse STL data.
///
/// Binary files may also start with `solid`, so a failed ASCII parse falls
/// back to the binary reader.
pub fn parse_stl(data: &[u8]) -> Result<Mesh, StlError> {
    if data.starts_with(b"solid") {
        match parse_ascii_stl_bytes(data) {
            Ok(mesh) => return Ok(mesh),
            Err(e) => log::debug!("not an ASCII STL ({e}), trying binary"),
        }
    }

    parse_binary_stl(data)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SQUARE: &str = "solid square
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 0 0
      vertex 1 1 0
    endloop
  endfacet
  facet normal 0 0 1
    outer loop
      vertex 0 0 0
      vertex 1 1 0
      vertex 0 1 0
    endloop
  endfacet
endsolid square
";

    fn binary_facets(facets: &[[[f32; 3]; 3]], announced: u32) -> Vec<u8> {
        let mut data = vec![0u8; HEADER_LEN];
        data.extend_from_slice(&announced.to_le_bytes());
        for facet in facets {
            data.extend_from_slice(&[0u8; 12]);
            for vertex in facet {
                for c in vertex {
                    data.extend_from_slice(&c.to_le_bytes());
                }
            }
            data.extend_from_slice(&[0u8; 2]);
        }
        data
    }

    #[test]
    fn test_parse_binary_header() {
        let data = binary_facets(&[], 0);
        let mesh = parse_binary_stl(&data).unwrap();
        assert_eq!(mesh.triangle_count(), 0);
    }

    #[test]
    fn test_parse_binary_facet() {
        let data = binary_facets(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]], 1);
        let mesh = parse_binary_stl(&data).unwrap();
        assert_eq!(mesh.triangle_count(), 1);
        assert_eq!(mesh.positions[1], Point3::new(1.0, 0.0, 0.0));
    }

    #[test]
    fn test_binary_errors() {
        assert!(matches!(parse_binary_stl(&[0u8; 10]), Err(StlError::TooSmall(10))));
        let data = binary_facets(&[[[0.0; 3]; 3]], 3);
        assert!(matches!(
            parse_binary_stl(&data),
            Err(StlError::Truncated { expected: 3, found: 1 })
        ));
    }

    #[test]
    fn test_parse_ascii_with_name() {
        let mesh = parse_ascii_stl(SQUARE).unwrap();
        assert_eq!(mesh.triangle_count(), 2);
        assert_eq!(mesh.vertex_count(), 4);
        assert_eq!(mesh.edges.len(), 5);
    }

    #[test]
    fn test_parse_stl_detects_format() {
        assert_eq!(parse_stl(SQUARE.as_bytes()).unwrap().triangle_count(), 2);

        // Binary header that happens to start with "solid"
        let mut data = binary_facets(&[[[0.0, 0.0, 0.0], [1.0, 0.0, 0.0], [0.0, 1.0, 0.0]]], 1);
        data[..5].copy_from_slice(b"solid");
        assert_eq!(parse_stl(&data).unwrap().triangle_count(), 1);
    }

    #[test]
    fn test_ascii_errors() {
        assert!(matches!(parse_ascii_stl("facet"), Err(StlError::Ascii(_))));
        assert_eq!(
            parse_ascii_stl_bytes(&[b's', 0xff, 0xfe]).unwrap_err(),
            StlError::InvalidUtf8
        );
    }
}
