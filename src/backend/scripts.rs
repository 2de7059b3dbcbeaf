//! Driver scripts handed to the external interpreters.
//!
//! Each script takes its inputs as positional arguments so no paths are
//! ever interpolated into source text.

/// Marker prefixed to the single result line printed by [`R_MEASURE`].
pub const RESULT_MARKER: &str = "VERSAMESH_RESULT ";

/// pymeshlab cleaning and decimation.
///
/// Arguments: input, output, pipeline, target faces, quality threshold,
/// minimum component size, preserve boundary (0/1), remesh (0/1).
pub const PY_SIMPLIFY: &str = r#"
import sys
import pymeshlab

src, dst, pipeline, faces, quality, min_component, preserve, remesh = sys.argv[1:9]
preserve = preserve == "1"

ms = pymeshlab.MeshSet()
ms.load_new_mesh(src)

if pipeline == "morley":
    ms.meshing_remove_connected_component_by_face_number(mincomponentsize=int(min_component))
    ms.meshing_decimation_quadric_edge_collapse(
        targetfacenum=int(faces),
        qualitythr=float(quality),
        preservenormal=True,
        preserveboundary=preserve,
    )
else:
    ms.meshing_remove_connected_component_by_diameter()
    ms.meshing_remove_connected_component_by_face_number()
    ms.meshing_remove_duplicate_faces()
    ms.meshing_remove_duplicate_vertices()
    ms.meshing_remove_unreferenced_vertices()
    ms.meshing_remove_null_faces()
    ms.compute_selection_by_non_manifold_edges_per_face()
    ms.compute_selection_by_non_manifold_per_vertex()
    ms.meshing_remove_selected_vertices_and_faces()
    ms.meshing_re_orient_faces_coherently()
    ms.meshing_decimation_quadric_edge_collapse(
        targetfacenum=int(faces),
        preservenormal=True,
        preserveboundary=preserve,
    )

if remesh == "1":
    ms.meshing_isotropic_explicit_remeshing()

ms.save_current_mesh(dst)
"#;

/// pymeshlab HC Laplacian smoothing (de Vries).
///
/// Arguments: input, output.
pub const PY_HC_SMOOTH: &str = r#"
import sys
import pymeshlab

src, dst = sys.argv[1:3]
ms = pymeshlab.MeshSet()
ms.load_new_mesh(src)
ms.apply_coord_hc_laplacian_smoothing()
ms.save_current_mesh(dst)
"#;

/// Rvcg Taubin smoothing followed by molaR cleaning (Morley).
///
/// Arguments: input, output, iterations, lambda, mu.
pub const R_TAUBIN_SMOOTH: &str = r#"
args <- commandArgs(trailingOnly = TRUE)
suppressPackageStartupMessages({
  library(Rvcg)
  library(molaR)
})
mesh <- vcgPlyRead(args[1], updateNormals = TRUE, clean = TRUE)
mesh <- vcgSmooth(mesh, type = "taubin", iteration = as.integer(args[3]),
                  lambda = as.numeric(args[4]), mu = as.numeric(args[5]))
mesh <- molaR_Clean(mesh, cleanType = "Both", verbose = TRUE)
vcgPlyWrite(mesh, args[2], binary = TRUE)
"#;

/// molaR DNE and OPCR plus doolkit RFI, printed as one JSON line.
///
/// Arguments: input.
pub const R_MEASURE: &str = r#"
args <- commandArgs(trailingOnly = TRUE)
suppressPackageStartupMessages({
  library(Rvcg)
  library(molaR)
  library(V8)
  library(doolkit)
  library(jsonlite)
})
mesh <- vcgPlyRead(args[1], updateNormals = TRUE, clean = TRUE)
dne <- DNE(mesh, BoundaryDiscard = "Vertex")
opcr <- OPCr(mesh)
result <- list(
  dne = c(dne[[1]][1], dne[[2]][1], dne[[3]][1], dne[[4]][1], dne[[5]][1]),
  opcr = opcr[[1]][1],
  opcr_breakdown = as.numeric(unlist(opcr[[2]])),
  rfi_boyer = rfi(mesh, method = "Boyer", hull = "concave")[[1]],
  rfi_ungar = rfi(mesh, method = "Ungar", hull = "concave")[[1]]
)
cat("VERSAMESH_RESULT ", toJSON(result, auto_unbox = TRUE, digits = NA), "\n", sep = "")
"#;
