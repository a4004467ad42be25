use crate::*;
use indexmap::IndexMap;
use num_bigint::BigUint;
use tracing::debug;

/// Counts for one proposal, before certification
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TallyResult {
    pub proposal_id: String,
    pub key_epoch: u32,

    /// Exactly the request's choice set, in declaration order, zero counts included
    pub per_choice_counts: IndexMap<ChoiceTag, u64>,
    pub total_count: u64,

    /// Milliseconds since the Unix epoch
    pub computed_at: u64,
}

/// Fold ciphertexts with homomorphic addition, starting from the encryption of zero.
pub fn accumulate<'c, I>(codec: &BallotCodec, ciphertexts: I) -> Result<Ciphertext, Error>
where
    I: IntoIterator<Item = &'c Ciphertext>,
{
    ciphertexts
        .into_iter()
        .try_fold(codec.identity(), |sum, c| codec.combine(&sum, c))
}

/// Tally a proposal inside the trusted boundary.
///
/// Ballots are grouped by option first and each group is summed and decrypted on its own, so
/// no individual ballot is ever decrypted. Either every option decrypts cleanly or the whole
/// tally fails.
pub fn tally(
    keypair: &KeyPair,
    max_choice_value: u64,
    request: &ProposalTallyRequest,
    computed_at: u64,
) -> Result<TallyResult, Error> {
    request.validate()?;
    let codec = BallotCodec::new(&keypair.public, max_choice_value);

    check_capacity(&keypair.public, request.ballots.len(), max_choice_value)?;

    let mut groups: IndexMap<&ChoiceTag, Vec<&Ciphertext>> = request
        .choice_set
        .iter()
        .map(|choice| (choice, Vec::new()))
        .collect();

    for ballot in request.ballots.iter() {
        match groups.get_mut(&ballot.choice) {
            Some(group) => group.push(&ballot.ciphertext),
            None => return Err(Error::UnknownChoice(ballot.choice.to_string())),
        }
    }

    let mut per_choice_counts = IndexMap::with_capacity(groups.len());
    let mut total_count: u64 = 0;
    for (choice, group) in groups {
        let aggregate = accumulate(&codec, group.iter().copied())?;
        let bound = (group.len() as u64).saturating_mul(max_choice_value);
        let count = keypair.decrypt_count(&aggregate, bound).map_err(|e| match e {
            Error::DecryptedCountOutOfBounds(_) => Error::DecryptedCountOutOfBounds(format!(
                "option {} decrypted above its {} ballot(s)",
                choice,
                group.len()
            )),
            other => other,
        })?;

        total_count = total_count.checked_add(count).ok_or_else(|| {
            Error::DecryptedCountOutOfBounds("total count overflows u64".to_owned())
        })?;
        per_choice_counts.insert(choice.clone(), count);
    }

    debug!(
        proposal_id = %request.proposal_id,
        ballots = request.ballots.len(),
        options = per_choice_counts.len(),
        "tally computed"
    );

    Ok(TallyResult {
        proposal_id: request.proposal_id.clone(),
        key_epoch: keypair.epoch(),
        per_choice_counts,
        total_count,
        computed_at,
    })
}

/// Refuse batches whose largest possible sum would reach the modulus.
pub fn check_capacity(
    params: &PublicParameters,
    ballots: usize,
    max_choice_value: u64,
) -> Result<(), Error> {
    let largest = BigUint::from(ballots as u64) * BigUint::from(max_choice_value);
    if largest >= params.n {
        return Err(Error::DecryptedCountOutOfBounds(format!(
            "{} ballots could wrap the {} bit modulus of epoch {}",
            ballots,
            params.bits(),
            params.epoch
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::paillier::tests::test_keypair;
    use rand::seq::SliceRandom;
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    fn ballots(keypair: &KeyPair, votes: &[(&str, usize)], seed: u64) -> Vec<EncryptedBallot> {
        let codec = BallotCodec::new(&keypair.public, 1);
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        let mut ballots = Vec::new();
        for (choice, times) in votes {
            for _ in 0..*times {
                ballots.push(EncryptedBallot {
                    choice: ChoiceTag::new(*choice),
                    ciphertext: codec.encrypt_with_rng(1, &mut rng).unwrap(),
                });
            }
        }
        ballots
    }

    fn request(ballots: Vec<EncryptedBallot>) -> ProposalTallyRequest {
        ProposalTallyRequest {
            proposal_id: "7".to_owned(),
            ballots,
            choice_set: default_choice_set(),
        }
    }

    #[test]
    fn test_counts_per_choice() {
        let keypair = test_keypair(1, 201);
        let request = request(ballots(&keypair, &[("inFavor", 3), ("against", 1)], 202));

        let result = tally(&keypair, 1, &request, 1_700_000_000_000).unwrap();
        let counts: Vec<(&str, u64)> = result
            .per_choice_counts
            .iter()
            .map(|(k, v)| (k.as_str(), *v))
            .collect();
        assert_eq!(counts, vec![("inFavor", 3), ("against", 1), ("abstain", 0)]);
        assert_eq!(result.total_count, 4);
        assert_eq!(
            result.total_count,
            result.per_choice_counts.values().sum::<u64>()
        );
    }

    #[test]
    fn test_order_independence() {
        let keypair = test_keypair(1, 203);
        let mut shuffled = ballots(
            &keypair,
            &[("inFavor", 5), ("against", 4), ("abstain", 2)],
            204,
        );
        let expected = tally(&keypair, 1, &request(shuffled.clone()), 0).unwrap();

        let mut rng = ChaCha20Rng::seed_from_u64(205);
        for _ in 0..5 {
            shuffled.shuffle(&mut rng);
            let result = tally(&keypair, 1, &request(shuffled.clone()), 0).unwrap();
            assert_eq!(result.per_choice_counts, expected.per_choice_counts);
        }
    }

    #[test]
    fn test_empty_batch() {
        let keypair = test_keypair(1, 206);
        let result = tally(&keypair, 1, &request(vec![]), 0).unwrap();
        assert_eq!(result.total_count, 0);
        assert_eq!(result.per_choice_counts.len(), 3);
        assert!(result.per_choice_counts.values().all(|c| *c == 0));
    }

    #[test]
    fn test_unknown_choice() {
        let keypair = test_keypair(1, 207);
        let request = request(ballots(&keypair, &[("inFavor", 1), ("maybe", 1)], 208));
        match tally(&keypair, 1, &request, 0) {
            Err(Error::UnknownChoice(choice)) => assert_eq!(choice, "maybe"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_overstuffed_ballot() {
        let keypair = test_keypair(1, 209);
        // A client that believes the domain goes up to 5
        let generous = BallotCodec::new(&keypair.public, 5);
        let mut rng = ChaCha20Rng::seed_from_u64(210);
        let request = request(vec![EncryptedBallot {
            choice: "inFavor".into(),
            ciphertext: generous.encrypt_with_rng(5, &mut rng).unwrap(),
        }]);

        assert!(matches!(
            tally(&keypair, 1, &request, 0),
            Err(Error::DecryptedCountOutOfBounds(_))
        ));
    }

    #[test]
    fn test_mixed_epochs() {
        let first = test_keypair(1, 211);
        let second = test_keypair(2, 212);
        let mut mixed = ballots(&first, &[("inFavor", 2)], 213);
        mixed.extend(ballots(&second, &[("inFavor", 1)], 214));

        assert!(matches!(
            tally(&first, 1, &request(mixed), 0),
            Err(Error::ParameterMismatch(_))
        ));
    }

    #[test]
    fn test_capacity() {
        use num_bigint::BigUint;
        let keypair =
            KeyPair::from_primes(3, BigUint::from(11u32), BigUint::from(13u32)).unwrap();
        assert!(check_capacity(&keypair.public, 142, 1).is_ok());
        assert!(matches!(
            check_capacity(&keypair.public, 143, 1),
            Err(Error::DecryptedCountOutOfBounds(_))
        ));
        assert!(matches!(
            check_capacity(&keypair.public, 50, 3),
            Err(Error::DecryptedCountOutOfBounds(_))
        ));
    }
}
